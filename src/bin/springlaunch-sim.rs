//! Predict one launch from the command line.
//!
//! Usage: springlaunch-sim [--config FILE] <position_mm> <pitch_deg> <height_m> <target_m> [target_height_m]
//!
//! Prints the prediction as JSON.

use std::error::Error;
use std::process;

use springlaunch::DeviceConfig;
use springlaunch::trajectory::{self, ShotInput};

const USAGE: &str =
    "Usage: springlaunch-sim [--config FILE] <position_mm> <pitch_deg> <height_m> <target_m> [target_height_m]";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(|s| s.as_str()), Some("--help") | Some("-h")) {
        println!("{USAGE}");
        return;
    }
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        eprintln!("{USAGE}");
        process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let (config, rest) = match args {
        [flag, path, rest @ ..] if flag == "--config" => {
            let text = std::fs::read_to_string(path)?;
            (DeviceConfig::from_json(&text)?, rest)
        }
        _ => (DeviceConfig::default(), args),
    };

    let numbers = rest
        .iter()
        .map(|s| s.parse::<f64>().map_err(|e| format!("{s:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    let (position, pitch, height, target, target_height) = match numbers.as_slice() {
        [p, a, h, t] => (*p, *a, *h, *t, config.target_height),
        [p, a, h, t, th] => (*p, *a, *h, *t, *th),
        _ => return Err("expected 4 or 5 numeric arguments".into()),
    };

    let model = config.energy_model()?;
    let input = ShotInput {
        position,
        launch_angle: pitch,
        device_height: height,
        lens_offset: config.lens_offset,
        target_distance: target,
    };
    let prediction = trajectory::predict(&model, &config.tuning, &input, target_height);
    println!("{}", prediction.to_json()?);
    Ok(())
}
