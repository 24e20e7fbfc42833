//! Command-line argument parsing for the haboob renderer.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Haboob renderer command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "haboob", about = "Render a volumetric dust storm to a PNG")]
pub struct CliArgs {
    /// Output width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Ray buffer scale relative to the output (0.5 = half resolution).
    #[arg(long)]
    pub ray_scale: Option<f32>,

    /// March step count.
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Beer shadow map resolution.
    #[arg(long)]
    pub shadow_resolution: Option<u32>,

    /// Output PNG path.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.output.width = w;
        }
        if let Some(h) = args.height {
            self.output.height = h;
        }
        if let Some(scale) = args.ray_scale {
            self.output.ray_scale = scale;
        }
        if let Some(iterations) = args.iterations {
            self.volume.march.iterations = iterations;
        }
        if let Some(res) = args.shadow_resolution {
            self.output.shadow_resolution = res;
        }
        if let Some(ref path) = args.output {
            self.output.path = path.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            width: Some(1920),
            iterations: Some(128),
            output: Some(PathBuf::from("storm.png")),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.output.width, 1920);
        assert_eq!(config.volume.march.iterations, 128);
        assert_eq!(config.output.path, PathBuf::from("storm.png"));
        // Non-overridden fields retain defaults
        assert_eq!(config.output.height, 720);
        assert_eq!(config.output.ray_scale, 0.5);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from(["haboob", "--ray-scale", "0.25", "-o", "out.png", "--log-level", "debug"]);
        assert_eq!(args.ray_scale, Some(0.25));
        assert_eq!(args.output, Some(PathBuf::from("out.png")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.width.is_none());
    }
}
