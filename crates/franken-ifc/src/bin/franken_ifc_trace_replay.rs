use std::error::Error;
use std::fs;
use std::path::PathBuf;

use frankenengine_ifc::{ControlFlowEvent, IfcConfig, IfcContext};

#[derive(Debug, Clone)]
struct CliArgs {
    trace_path: PathBuf,
    config_path: Option<PathBuf>,
    keep_going: bool,
}

const USAGE: &str =
    "usage: franken_ifc_trace_replay --trace <path> [--config <path>] [--keep-going]";

fn parse_args() -> Result<CliArgs, String> {
    let mut trace_path = None;
    let mut config_path = None;
    let mut keep_going = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--trace" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--trace requires a value".to_string())?;
                trace_path = Some(PathBuf::from(value));
            }
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--keep-going" => keep_going = true,
            "--help" | "-h" => return Err(USAGE.to_string()),
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(CliArgs {
        trace_path: trace_path.ok_or_else(|| USAGE.to_string())?,
        config_path,
        keep_going,
    })
}

fn load_config(path: Option<&PathBuf>) -> Result<IfcConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(IfcConfig::load(path)?),
        None => Ok(IfcConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args =
        parse_args().map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;

    let config = load_config(args.config_path.as_ref())?;
    let trace = fs::read_to_string(&args.trace_path)?;
    let steps: Vec<ControlFlowEvent> = serde_json::from_str(&trace)?;

    let mut context = IfcContext::new(&config);
    let mut blocked = 0u64;
    for (index, step) in steps.iter().enumerate() {
        match context.apply(step) {
            Ok(pc) => {
                println!(
                    "ifc step={index} pc={pc} depth={}",
                    context.stack().depth()
                );
            }
            Err(err) => {
                blocked += 1;
                println!("ifc step={index} blocked={} ({err})", err.error_code());
                if !args.keep_going {
                    return Err(format!(
                        "IFC replay halted at step {index}: {err} (see {})",
                        args.trace_path.display()
                    )
                    .into());
                }
                context.state_mut().clear_abort();
            }
        }
    }

    println!("ifc trace_id={}", context.trace_id());
    println!("ifc steps={}", steps.len());
    println!("ifc blocked={blocked}");
    println!("ifc final_pc={}", context.program_counter());
    println!("ifc final_depth={}", context.stack().depth());
    println!("ifc registered_origins={}", context.registry().len());
    println!("ifc events={}", context.events().len());
    println!(
        "ifc diagnostics={}",
        context.event_log().diagnostics().count()
    );
    println!("ifc event_digest={}", context.event_log().digest());

    Ok(())
}
