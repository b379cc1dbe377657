//! Operator configuration
//!
//! Every setting is a CLI flag that falls back to an environment variable.

use clap::Args;

use nats_controller::overrides::ContainerImages;
use nats_controller::AllowedIdentity;

/// Settings for the controller process
#[derive(Args, Debug, Clone)]
pub struct OperatorConfig {
    /// Log level used when `RUST_LOG` is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory of the bundled NATS chart
    #[arg(long, env = "NATS_CHART_DIR", default_value = "charts/nats")]
    pub chart_dir: std::path::PathBuf,

    /// Name of the only NATS resource the operator accepts
    #[arg(long, env = "NATS_CR_NAME", default_value = "eventing-nats")]
    pub cr_name: String,

    /// Namespace of the only NATS resource the operator accepts
    #[arg(long, env = "NATS_CR_NAMESPACE", default_value = "kyma-system")]
    pub cr_namespace: String,

    /// Use the FIPS image variants
    #[arg(long, env = "KYMA_FIPS_MODE_ENABLED", default_value_t = false)]
    pub fips_mode_enabled: bool,

    /// NATS server image
    #[arg(long, env = "NATS_IMAGE", default_value = "")]
    pub nats_image: String,

    /// NATS server image for FIPS mode
    #[arg(long, env = "NATS_IMAGE_FIPS", default_value = "")]
    pub nats_image_fips: String,

    /// Config reloader image
    #[arg(long, env = "NATS_SERVER_CONFIG_RELOADER_IMAGE", default_value = "")]
    pub reloader_image: String,

    /// Config reloader image for FIPS mode
    #[arg(long, env = "NATS_SERVER_CONFIG_RELOADER_IMAGE_FIPS", default_value = "")]
    pub reloader_image_fips: String,

    /// Prometheus exporter image
    #[arg(long, env = "PROMETHEUS_NATS_EXPORTER_IMAGE", default_value = "")]
    pub exporter_image: String,

    /// Prometheus exporter image for FIPS mode
    #[arg(long, env = "PROMETHEUS_NATS_EXPORTER_IMAGE_FIPS", default_value = "")]
    pub exporter_image_fips: String,

    /// Alpine image for init containers
    #[arg(long, env = "ALPINE_IMAGE", default_value = "")]
    pub alpine_image: String,

    /// Alpine image for FIPS mode
    #[arg(long, env = "ALPINE_IMAGE_FIPS", default_value = "")]
    pub alpine_image_fips: String,
}

impl OperatorConfig {
    /// Images to pass to the chart, FIPS variants when FIPS mode is on
    pub fn image_config(&self) -> ContainerImages {
        let pick = |regular: &str, fips: &str| {
            if self.fips_mode_enabled {
                fips.to_string()
            } else {
                regular.to_string()
            }
        };

        ContainerImages {
            nats: pick(&self.nats_image, &self.nats_image_fips),
            reloader: pick(&self.reloader_image, &self.reloader_image_fips),
            exporter: pick(&self.exporter_image, &self.exporter_image_fips),
            alpine: pick(&self.alpine_image, &self.alpine_image_fips),
        }
    }

    /// The one NATS resource allowed in the cluster
    pub fn allowed_identity(&self) -> AllowedIdentity {
        AllowedIdentity::new(&self.cr_name, &self.cr_namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: OperatorConfig,
    }

    fn parse(args: &[&str]) -> OperatorConfig {
        let argv = std::iter::once("nats-manager").chain(args.iter().copied());
        TestCli::try_parse_from(argv)
            .expect("arguments should parse")
            .config
    }

    const IMAGE_ARGS: &[&str] = &[
        "--nats-image",
        "nats:2.10",
        "--nats-image-fips",
        "nats:2.10-fips",
        "--reloader-image",
        "reloader:0.16",
        "--reloader-image-fips",
        "reloader:0.16-fips",
        "--exporter-image",
        "exporter:0.15",
        "--exporter-image-fips",
        "exporter:0.15-fips",
        "--alpine-image",
        "alpine:3.20",
        "--alpine-image-fips",
        "alpine:3.20-fips",
    ];

    #[test]
    fn defaults_allow_eventing_nats() {
        let config = parse(&[]);
        assert_eq!(config.chart_dir, std::path::PathBuf::from("charts/nats"));
        assert_eq!(
            config.allowed_identity(),
            AllowedIdentity::new("eventing-nats", "kyma-system")
        );
        assert!(!config.fips_mode_enabled);
        assert_eq!(config.image_config(), ContainerImages::default());
    }

    #[rstest]
    #[case::regular(false, "nats:2.10", "alpine:3.20")]
    #[case::fips(true, "nats:2.10-fips", "alpine:3.20-fips")]
    fn fips_mode_selects_image_variants(
        #[case] fips: bool,
        #[case] nats: &str,
        #[case] alpine: &str,
    ) {
        let mut args = IMAGE_ARGS.to_vec();
        if fips {
            args.push("--fips-mode-enabled");
        }
        let images = parse(&args).image_config();
        assert_eq!(images.nats, nats);
        assert_eq!(images.alpine, alpine);
        assert_eq!(images.reloader.ends_with("-fips"), fips);
        assert_eq!(images.exporter.ends_with("-fips"), fips);
    }
}
