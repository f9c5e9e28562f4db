use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Region file not found. Looked in:\n\
        - current directory: nimbus.local.yaml, .nimbus.local.yaml, nimbus.yaml, .nimbus.yaml\n\
        - ./.nimbus/ directory\n\
        - ~/.config/nimbus/nimbus.yaml\n\
        Set NIMBUS_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Region {provider}/{region} is defined more than once")]
    DuplicateRegion { provider: String, region: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
