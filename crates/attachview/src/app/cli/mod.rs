use bevy::prelude::Resource;
use clap::Parser;
use std::path::PathBuf;

use crate::lib::geometry::NormalizationScope;
use crate::lib::settings::{Settings, ViewerConfig};

#[derive(Parser, Debug, Resource)]
#[command(name = "attachview")]
#[command(about = "A 3D viewer for clinical attachments", long_about = None)]
pub struct Args {
    /// Base URL of the record service (overrides attachview.toml)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// List the attachments of this owner in the side panel
    #[arg(long, value_name = "ID")]
    pub owner_id: Option<String>,

    /// Open this attachment data href directly
    #[arg(long, value_name = "HREF", requires = "media_type")]
    pub attachment: Option<String>,

    /// Media type of the attachment given with --attachment
    #[arg(long, value_name = "TYPE")]
    pub media_type: Option<String>,

    /// Display name of the attachment given with --attachment
    #[arg(long)]
    pub name: Option<String>,

    /// Settings file (defaults to ./attachview.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Spline normalization scope: 'global' (shared frame) or 'per-spline'
    #[arg(long, value_name = "SCOPE")]
    pub scope: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Log frame time diagnostics
    #[arg(long)]
    pub diagnostics: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Apply command-line overrides on top of the file settings
    pub fn apply(&self, settings: &Settings) -> Result<ViewerConfig, String> {
        let mut config = settings.resolve();
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(scope) = &self.scope {
            config.normalization_scope = NormalizationScope::from_str(scope)?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_settings() {
        let args = Args::parse_from([
            "attachview",
            "--base-url",
            "http://records:9000",
            "--scope",
            "per-spline",
        ]);
        let config = args.apply(&Settings::default()).unwrap();
        assert_eq!(config.base_url, "http://records:9000");
        assert_eq!(config.normalization_scope, NormalizationScope::PerSpline);
    }

    #[test]
    fn test_bad_scope_is_rejected() {
        let args = Args::parse_from(["attachview", "--scope", "sideways"]);
        assert!(args.apply(&Settings::default()).is_err());
    }

    #[test]
    fn test_attachment_requires_media_type() {
        assert!(Args::try_parse_from(["attachview", "--attachment", "/a/1/data"]).is_err());
        let args = Args::try_parse_from([
            "attachview",
            "--attachment",
            "/a/1/data",
            "--media-type",
            "model/gltf+json",
        ])
        .unwrap();
        assert_eq!(args.media_type.as_deref(), Some("model/gltf+json"));
    }
}
