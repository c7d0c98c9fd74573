use anyhow::{anyhow, Context};
use harvest_harness::export::export_vault_names;
use harvest_harness::harness::HarnessBuilder;
use harvest_harness::sim::PolygonFixture;
use harvest_harness::suite::{SuiteReport, SuiteRunner};
use harvest_harness::utils::config::HarnessConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: harvest_harness suite [--cycles N] [--seconds-per-cycle S] [--json]\n       harvest_harness export [--out DIR]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Suite {
        cycles: Option<usize>,
        seconds_per_cycle: Option<u64>,
        json: bool,
    },
    Export {
        out: Option<PathBuf>,
    },
}

fn flag_value<'a, I>(flag: &str, args: &mut I) -> anyhow::Result<String>
where
    I: Iterator<Item = &'a String>,
{
    args.next()
        .cloned()
        .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    let mut iter = args.iter();
    let Some(subcommand) = iter.next() else {
        return Ok(Command::Suite {
            cycles: None,
            seconds_per_cycle: None,
            json: false,
        });
    };
    match subcommand.as_str() {
        "suite" => {
            let mut cycles = None;
            let mut seconds_per_cycle = None;
            let mut json = false;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--cycles" => {
                        let raw = flag_value(arg, &mut iter)?;
                        cycles = Some(
                            raw.parse::<usize>()
                                .with_context(|| format!("--cycles got `{raw}`"))?,
                        );
                    }
                    "--seconds-per-cycle" => {
                        let raw = flag_value(arg, &mut iter)?;
                        seconds_per_cycle = Some(
                            raw.parse::<u64>()
                                .with_context(|| format!("--seconds-per-cycle got `{raw}`"))?,
                        );
                    }
                    "--json" => json = true,
                    other => return Err(anyhow!("unknown suite argument `{other}`\n{USAGE}")),
                }
            }
            Ok(Command::Suite {
                cycles,
                seconds_per_cycle,
                json,
            })
        }
        "export" => {
            let mut out = None;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--out" => out = Some(PathBuf::from(flag_value(arg, &mut iter)?)),
                    other => return Err(anyhow!("unknown export argument `{other}`\n{USAGE}")),
                }
            }
            Ok(Command::Export { out })
        }
        other => Err(anyhow!("unknown command `{other}`\n{USAGE}")),
    }
}

fn print_report(report: &SuiteReport) {
    println!(
        "[SUITE] {} vault={:#x} start_balance={}",
        report.strategy, report.vault, report.start_balance
    );
    for shortfall in &report.shortfalls {
        println!(
            "[SUITE]   basket shortfall {:#x}: {}",
            shortfall.token, shortfall.reason
        );
    }
    for case in &report.cases {
        let status = if case.passed { "PASS" } else { "FAIL" };
        println!("[SUITE]   {status} {} ({} ms)", case.name, case.elapsed_ms);
        if let Some(failure) = &case.failure {
            println!("[SUITE]        {failure}");
        }
    }
    for cycle in &report.cycles {
        println!(
            "[HARVEST]   cycle={} t+{}s ready={}->{} vault_value={}",
            cycle.cycle, cycle.elapsed, cycle.ready_before, cycle.ready_after, cycle.vault_value_after
        );
    }
}

async fn run_suite(
    mut config: HarnessConfig,
    cycles: Option<usize>,
    seconds_per_cycle: Option<u64>,
    json: bool,
) -> anyhow::Result<bool> {
    if let Some(cycles) = cycles {
        config.cycles = cycles;
    }
    if let Some(seconds) = seconds_per_cycle {
        config.seconds_per_cycle = seconds;
    }

    let fixture = PolygonFixture::build()?;
    let report = SuiteRunner::new(&fixture.chain, &fixture.config, &config)
        .run(
            &fixture.descriptor(),
            &fixture.reward_tokens(),
            &fixture.conversion_targets(),
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.passed())
}

async fn run_export(config: HarnessConfig, out: Option<PathBuf>) -> anyhow::Result<()> {
    let out_dir = out.unwrap_or_else(|| config.export_dir.clone());
    let fixture = PolygonFixture::build()?;
    let harness = HarnessBuilder::new(&fixture.chain, &fixture.config, &config)
        .build(
            &fixture.descriptor(),
            &fixture.reward_tokens(),
            &fixture.conversion_targets(),
        )
        .await?;
    let summary = export_vault_names(&fixture.chain, harness.core.bookkeeper, &out_dir).await?;
    println!(
        "[EXPORT] assets={} -> {}",
        summary.assets,
        summary.assets_path.display()
    );
    println!(
        "[EXPORT] vaults={} -> {}",
        summary.vaults,
        summary.vaults_path.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let command = parse_command(&args)?;
    let config = HarnessConfig::from_env()?;
    tracing::info!(
        "[STARTUP] cycles={} seconds_per_cycle={} base_amount={} target_index={}",
        config.cycles,
        config.seconds_per_cycle,
        config.base_amount,
        config.target_token_index
    );

    match command {
        Command::Suite {
            cycles,
            seconds_per_cycle,
            json,
        } => {
            if !run_suite(config, cycles, seconds_per_cycle, json).await? {
                std::process::exit(1);
            }
        }
        Command::Export { out } => run_export(config, out).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_arguments_runs_default_suite() {
        assert_eq!(
            parse_command(&[]).unwrap(),
            Command::Suite {
                cycles: None,
                seconds_per_cycle: None,
                json: false
            }
        );
    }

    #[test]
    fn test_suite_flags_are_parsed() {
        let parsed =
            parse_command(&args(&["suite", "--cycles", "5", "--seconds-per-cycle", "120", "--json"]))
                .unwrap();
        assert_eq!(
            parsed,
            Command::Suite {
                cycles: Some(5),
                seconds_per_cycle: Some(120),
                json: true
            }
        );
    }

    #[test]
    fn test_export_out_dir_and_bad_input() {
        assert_eq!(
            parse_command(&args(&["export", "--out", "/tmp/names"])).unwrap(),
            Command::Export {
                out: Some(PathBuf::from("/tmp/names"))
            }
        );
        assert!(parse_command(&args(&["suite", "--cycles"])).is_err());
        assert!(parse_command(&args(&["suite", "--cycles", "many"])).is_err());
        assert!(parse_command(&args(&["deploy"])).is_err());
    }
}
