use thiserror::Error;

/// Fatal configuration errors. These abort caller construction; they are
/// never produced while calling a region (region-level conditions are
/// reported through `calling::RegionOutcome` instead).
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("ploidy must be > 0")]
    ZeroPloidy,
    #[error("max genotypes must be > 0")]
    ZeroMaxGenotypes,
    #[error("normal sample {name} is not a valid sample")]
    InvalidNormalSample { name: String },
    #[error("trio samples must be distinct and part of the sample set")]
    InvalidTrio,
    #[error("sample {name} not found in likelihood cache")]
    UnknownSample { name: String },
    #[error("somatic mutation rate must be in (0, 1), got {rate}")]
    InvalidSomaticMutationRate { rate: f64 },
    #[error("credible mass must be in (0, 1), got {mass}")]
    InvalidCredibleMass { mass: f64 },
    #[error("minimum somatic frequency must be in (0, 1), got {freq}")]
    InvalidSomaticFrequency { freq: f64 },
    #[error("at least one sample is required")]
    NoSamples,
}
