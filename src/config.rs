//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::provider::{AwsCliSettings, DEFAULT_AWS_BIN, DEFAULT_PROFILE};

/// Tag key used to select instances and volumes when none is configured.
pub const DEFAULT_LIFECYCLE_TAG_KEY: &str = "Test";

/// Snapshot description used when none is configured.
pub const DEFAULT_DESCRIPTION: &str = "Manufactured by MakeSnapshotWorker";

/// Run settings derived from defaults, configuration files, and environment
/// variables (`EBS_SNAPPER_*`).
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "EBS_SNAPPER",
    discovery(
        app_name = "ebs-snapper",
        env_var = "EBS_SNAPPER_CONFIG_PATH",
        config_file_name = "ebs-snapper.toml",
        dotfile_name = ".ebs-snapper.toml",
        project_file_name = "ebs-snapper.toml"
    )
)]
pub struct SnapperConfig {
    /// Path to the `aws` executable.
    #[ortho_config(default = DEFAULT_AWS_BIN.to_owned())]
    pub aws_bin: String,
    /// Named credentials profile. Defaults to `default`.
    #[ortho_config(default = DEFAULT_PROFILE.to_owned())]
    pub profile: String,
    /// Region override; the AWS CLI default region applies when unset.
    pub region: Option<String>,
    /// Tag key whose `daily`/`weekly`/`monthly` value marks instances and
    /// volumes for snapshotting.
    #[ortho_config(default = DEFAULT_LIFECYCLE_TAG_KEY.to_owned())]
    pub lifecycle_tag_key: String,
    /// Description attached to every snapshot of the run.
    #[ortho_config(default = DEFAULT_DESCRIPTION.to_owned())]
    pub description: String,
    /// Validate snapshot requests without creating snapshots. Defaults to
    /// `true`; a real run must opt out explicitly.
    #[ortho_config(default = true)]
    pub dry_run: bool,
    /// Comma separated volume tag keys copied onto each snapshot in
    /// addition to `Name`.
    pub copy_tags: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl Default for SnapperConfig {
    fn default() -> Self {
        Self {
            aws_bin: DEFAULT_AWS_BIN.to_owned(),
            profile: DEFAULT_PROFILE.to_owned(),
            region: None,
            lifecycle_tag_key: DEFAULT_LIFECYCLE_TAG_KEY.to_owned(),
            description: DEFAULT_DESCRIPTION.to_owned(),
            dry_run: true,
            copy_tags: None,
        }
    }
}

impl SnapperConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to ebs-snapper.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("ebs-snapper")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is blank
    /// and [`ConfigError::InvalidField`] when `copy_tags` holds an empty key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.aws_bin,
            &FieldMetadata::new("AWS CLI binary", "EBS_SNAPPER_AWS_BIN", "aws_bin"),
        )?;
        Self::require_field(
            &self.profile,
            &FieldMetadata::new("AWS profile", "EBS_SNAPPER_PROFILE", "profile"),
        )?;
        Self::require_field(
            &self.lifecycle_tag_key,
            &FieldMetadata::new(
                "lifecycle tag key",
                "EBS_SNAPPER_LIFECYCLE_TAG_KEY",
                "lifecycle_tag_key",
            ),
        )?;
        Self::require_field(
            &self.description,
            &FieldMetadata::new(
                "snapshot description",
                "EBS_SNAPPER_DESCRIPTION",
                "description",
            ),
        )?;
        if let Some(region) = &self.region
            && region.trim().is_empty()
        {
            return Err(ConfigError::InvalidField {
                field: String::from("region"),
                message: String::from("must not be blank when set"),
            });
        }
        if let Some(raw) = &self.copy_tags
            && raw.split(',').any(|key| key.trim().is_empty())
        {
            return Err(ConfigError::InvalidField {
                field: String::from("copy_tags"),
                message: format!("'{raw}' contains an empty tag key"),
            });
        }
        Ok(())
    }

    /// Tag keys to copy from the volume onto its snapshot.
    #[must_use]
    pub fn copy_tag_keys(&self) -> Vec<String> {
        self.copy_tags
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// AWS CLI invocation settings.
    #[must_use]
    pub fn aws_cli_settings(&self) -> AwsCliSettings {
        AwsCliSettings {
            aws_bin: self.aws_bin.trim().to_owned(),
            profile: self.profile.trim().to_owned(),
            region: self.region.as_deref().map(|region| region.trim().to_owned()),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configured value is malformed.
    #[error("invalid {field}: {message}")]
    InvalidField {
        /// Offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
