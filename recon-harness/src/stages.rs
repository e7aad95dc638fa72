//! Stage descriptors for the reconstruction pipeline.
//!
//! A [`StageDescriptor`] is everything the suite needs to run one stage:
//! the structured command, the stages whose outputs it consumes, the file it
//! is responsible for producing, the output contract, and how to display the
//! result when visualization is on.

use crate::config::HarnessConfig;
use crate::errors::ConfigError;
use crate::runner::{CliOption, CommandSpec};
use crate::verify::Expectation;
use crate::visualize::DisplaySpec;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Trace count of the forward model for the reference trajectory.
pub const KSPACE_TRACES: usize = 2048;

/// Number of traces shown when displaying k-space.
const DISPLAY_TRACES: usize = 256;

/// A subcommand of the reconstruction tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subcommand {
    /// Phantom generation.
    Phantom,
    /// Sensitivity-map simulation.
    SenseSim,
    /// Reconstruction; with `--fwd`, k-space synthesis.
    Recon,
    /// Root-sum-of-squares channel combination.
    Rss,
    /// Non-uniform FFT regridding.
    Nufft,
}

impl Subcommand {
    /// The name passed on the command line.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phantom => "phantom",
            Self::SenseSim => "sense-sim",
            Self::Recon => "recon",
            Self::Rss => "rss",
            Self::Nufft => "nufft",
        }
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage of the suite.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDescriptor {
    /// Unique stage name, as registered in the execution order.
    pub name: String,
    /// The tool subcommand.
    pub subcommand: Subcommand,
    /// Positional arguments, relative to the working directory.
    pub positional: Vec<String>,
    /// Command-line options, in order.
    pub options: Vec<CliOption>,
    /// Names of stages whose outputs this stage consumes.
    pub inputs: Vec<String>,
    /// Suffix of the primary output, appended to the shared prefix.
    pub output_suffix: String,
    /// The output contract.
    pub expectation: Expectation,
    /// How to show the output when visualization is enabled.
    pub display: Option<DisplaySpec>,
}

impl StageDescriptor {
    /// Creates a descriptor with no arguments, inputs or display.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        subcommand: Subcommand,
        output_suffix: impl Into<String>,
        expectation: Expectation,
    ) -> Self {
        Self {
            name: name.into(),
            subcommand,
            positional: Vec::new(),
            options: Vec::new(),
            inputs: Vec::new(),
            output_suffix: output_suffix.into(),
            expectation,
            display: None,
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn positional(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Appends an option.
    #[must_use]
    pub fn option(mut self, option: CliOption) -> Self {
        self.options.push(option);
        self
    }

    /// Declares a stage whose output this stage reads.
    #[must_use]
    pub fn input(mut self, stage: impl Into<String>) -> Self {
        self.inputs.push(stage.into());
        self
    }

    /// Sets the display spec.
    #[must_use]
    pub fn display(mut self, display: DisplaySpec) -> Self {
        self.display = Some(display);
        self
    }

    /// Builds the structured command for `tool`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] if a positional argument is
    /// empty or spans lines.
    pub fn command(&self, tool: &str) -> Result<CommandSpec, ConfigError> {
        let mut command = CommandSpec::new(tool, self.subcommand.as_str());
        for value in &self.positional {
            command = command.arg(value.clone())?;
        }
        Ok(self
            .options
            .iter()
            .cloned()
            .fold(command, CommandSpec::option))
    }

    /// Where this stage writes its primary output.
    #[must_use]
    pub fn output_path(&self, config: &HarnessConfig) -> PathBuf {
        config.output_path(&self.output_suffix)
    }
}

/// Stage names of the reconstruction suite, in dependency order.
pub const RIESLING_ORDER: [&str; 5] = ["image", "sense", "kspace", "rss", "nufft"];

/// Builds the five-stage reconstruction suite.
///
/// Expected contracts follow the configured matrix and channel count; the
/// trace count is the reference trajectory's. A `[expect.<stage>]` table in
/// the configuration replaces the built-in contract for that stage.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a configured value cannot be passed as a
/// command-line option.
pub fn riesling_stages(config: &HarnessConfig) -> Result<Vec<StageDescriptor>, ConfigError> {
    let prefix = config.prefix.as_str();
    let m = config.matrix;
    let channels = config.channels;
    let slices = vec![m / 4, m / 2, 3 * m / 4];

    let image_expect = Expectation::new(vec![1, m, m, m, 1], ["volume", "z", "y", "x", "image"]);

    let mut image = StageDescriptor::new("image", Subcommand::Phantom, "", image_expect.clone())
        .positional(prefix)
        .option(CliOption::value("matrix", m)?)
        .option(CliOption::value("vox-size", config.voxel_size)?)
        .option(CliOption::value("nex", config.nex)?);
    if config.gradcubes {
        image = image.option(CliOption::flag("gradcubes")?);
    }
    let image = image
        .option(CliOption::value("size", config.phantom_size)?)
        .display(
            DisplaySpec::new("x", "y", "phantom")
                .index("volume", 0)
                .index("image", 0)
                .indices("z", slices.clone()),
        );

    let sense = StageDescriptor::new(
        "sense",
        Subcommand::SenseSim,
        "-sim-sense",
        Expectation::new(vec![m, m, m, channels], ["z", "y", "x", "channel"]),
    )
    .positional(format!("{prefix}-sim"))
    .option(CliOption::value("matrix", m)?)
    .option(CliOption::value("vox-size", config.voxel_size)?)
    .option(CliOption::value("channels", channels)?)
    .display(DisplaySpec::new("x", "y", "sim-sense").index("z", m / 2));

    let kspace = StageDescriptor::new(
        "kspace",
        Subcommand::Recon,
        "-recon",
        Expectation::new(
            vec![1, 1, KSPACE_TRACES, m, channels],
            ["volume", "slab", "trace", "sample", "channel"],
        )
        .with_attr_shape("trajectory", vec![KSPACE_TRACES, m, 3]),
    )
    .input("image")
    .input("sense")
    .option(CliOption::flag("fwd")?)
    .option(CliOption::value("sense", format!("{prefix}-sim-sense.h5"))?)
    .option(CliOption::value("sense-fov", config.sense_fov)?)
    .positional(format!("{prefix}.h5"))
    .display(
        DisplaySpec::new("sample", "trace", "recon")
            .index("volume", 0)
            .index("slab", 0)
            .index("channel", 0)
            .range("trace", 0..DISPLAY_TRACES.min(KSPACE_TRACES)),
    );

    let rss = StageDescriptor::new("rss", Subcommand::Rss, "-recon-rss", image_expect)
        .input("kspace")
        .positional(format!("{prefix}-recon.h5"))
        .display(
            DisplaySpec::new("x", "y", "rss")
                .index("volume", 0)
                .index("image", 0)
                .indices("z", slices.clone()),
        );

    let nufft = StageDescriptor::new(
        "nufft",
        Subcommand::Nufft,
        "-recon-nufft",
        Expectation::new(
            vec![1, m, m, m, 1, channels],
            ["volume", "z", "y", "x", "image", "channel"],
        ),
    )
    .input("kspace")
    .positional(format!("{prefix}-recon.h5"))
    .option(CliOption::value("out", prefix)?)
    .display(
        DisplaySpec::new("x", "y", "nufft - channel=0")
            .index("volume", 0)
            .index("image", 0)
            .index("channel", 0)
            .indices("z", slices),
    );

    let mut stages = vec![image, sense, kspace, rss, nufft];
    for stage in &mut stages {
        if let Some(expect) = config.expect.get(&stage.name) {
            stage.expectation = expect.clone();
        }
    }
    Ok(stages)
}
