use hpcontract_runtime::{PatchConfig, PatchConfigData};
use serde::Serialize;

use crate::cmd::{runtime, CheckConfigArgs};
use crate::exit::{config_error, CliResult, SUCCESS};
use crate::output::{print_fields, print_json, print_pretty, OutputFormat};

#[derive(Serialize)]
struct ConfigSummary<'a> {
    path: String,
    valid: bool,
    version: &'a str,
    unl_count: usize,
    bin_path: &'a str,
    consensus_mode: &'static str,
    roundtime: u64,
    stage_slice: u32,
    threshold: u32,
    npl_mode: &'static str,
    max_input_ledger_offset: u64,
}

impl<'a> ConfigSummary<'a> {
    fn new(patch: &PatchConfig, config: &'a PatchConfigData) -> Self {
        Self {
            path: patch.path().display().to_string(),
            valid: true,
            version: &config.version,
            unl_count: config.unl.len(),
            bin_path: &config.bin_path,
            consensus_mode: config.consensus.mode.as_str(),
            roundtime: config.consensus.roundtime,
            stage_slice: config.consensus.stage_slice,
            threshold: config.consensus.threshold,
            npl_mode: config.npl.mode.as_str(),
            max_input_ledger_offset: config.max_input_ledger_offset,
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("path", self.path.clone()),
            ("version", self.version.to_string()),
            ("unl", self.unl_count.to_string()),
            ("bin_path", self.bin_path.to_string()),
            ("consensus", self.consensus_mode.to_string()),
            ("roundtime_ms", self.roundtime.to_string()),
            ("stage_slice", self.stage_slice.to_string()),
            ("threshold", self.threshold.to_string()),
            ("npl", self.npl_mode.to_string()),
            (
                "max_input_ledger_offset",
                self.max_input_ledger_offset.to_string(),
            ),
        ]
    }
}

pub fn run(args: CheckConfigArgs, format: OutputFormat) -> CliResult<i32> {
    let patch = PatchConfig::new(args.path);
    let config = runtime()?
        .block_on(patch.get_config())
        .map_err(|err| config_error("load failed", err))?;
    config
        .validate()
        .map_err(|err| config_error("invalid patch config", err))?;

    let summary = ConfigSummary::new(&patch, &config);
    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Table => print_fields(&summary.rows()),
        OutputFormat::Pretty => print_pretty(&summary.rows()),
    }
    Ok(SUCCESS)
}
