use std::env;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use log::info;

use admdp::{Adg, Admdp};
use admdp::tree::scenario::Scenario;
use admdp::uppaal::{UppaalExporter, QueryConf};
use admdp::verify::Verifyta;

fn run(scenario: OsString, output: PathBuf) -> io::Result<()> {
    let reader = BufReader::new(File::open(&scenario)?);
    let scenario: Scenario = serde_json::from_reader(reader)?;
    let (tree, root) = scenario.into_tree()?;
    let admdp = Admdp::new(Adg::new(tree, root)?)?;
    println!("{admdp}");
    match admdp.accepting() {
        Some(goal) => println!("Root goal is reached in state {goal}"),
        None => println!("Root goal is unreachable"),
    }

    let conf = if env::var_os("ADMDP_FAST").is_some() { QueryConf::FAST } else { QueryConf::STANDARD };
    let exporter = UppaalExporter::with_conf(&admdp, conf);
    exporter.write(&output)?;
    println!("Wrote {}", output.display());

    let Some(verifyta) = Verifyta::from_env() else {
        info!("{} is not set, skipping verification", admdp::verify::VERIFYTA_ENV);
        return Ok(());
    };
    for result in verifyta.run(&output, &exporter.queries())? {
        if !result.satisfied {
            println!("{}: no strategy found", result.strategy);
            continue;
        }
        println!("{}:", result.strategy);
        if let Some(time) = result.expected_time {
            println!("    E(time) = {} \u{b1} {}", time.mean, time.deviation);
        }
        if let Some(cost) = result.expected_cost {
            println!("    E(cost) = {} \u{b1} {}", cost.mean, cost.deviation);
        }
        if let Some((low, high)) = result.success_probability {
            println!("    P(success) in [{low}, {high}]");
        }
    }
    Ok(())
}

fn main() -> io::Result<()> {
    env_logger::init();
    let mut args = env::args_os();
    match args.len() {
        2 | 3 => {
            let scenario = args.nth(1).unwrap_or_default();
            let output = args.next().map_or_else(|| PathBuf::from("admdp.xml"), PathBuf::from);
            run(scenario, output)
        },
        _ => {
            eprintln!("Invalid arguments. Usage: {:?} <scenario.json> [output.xml]", args.next().unwrap_or_default());
            std::process::exit(2);
        },
    }
}
