//! Annotate a video with its optical flow, and report per-stage timings as JSON

use anyhow::{Context, Result};
use clap::*;
use flowbench::prelude::v1::*;
use log::*;
use std::fs::File;
use std::io::BufWriter;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("flowbench")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .takes_value(true)
                .required_unless_present("config"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .takes_value(true)
                .help("Rendered video path (default: <input>_processed.mp4)"),
        )
        .arg(
            Arg::new("resolution")
                .long("resolution")
                .short('r')
                .takes_value(true)
                .help("Output resolution, WIDTHxHEIGHT"),
        )
        .arg(
            Arg::new("post-processing")
                .long("post-processing")
                .short('p')
                .takes_value(true)
                .help("none, heatmap, arrows or both"),
        )
        .arg(
            Arg::new("pipeline")
                .long("pipeline")
                .short('d')
                .takes_value(true)
                .help("cpu or gpu"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true)
                .help("JSON file with request defaults"),
        )
        .arg(
            Arg::new("timings-csv")
                .long("timings-csv")
                .takes_value(true)
                .help("Write per-frame stage timings to a CSV file"),
        )
        .get_matches();

    let mut request = match matches.value_of("config") {
        Some(path) => ProcessRequest::from_json_file(path)?,
        None => ProcessRequest::default(),
    };

    if let Some(input) = matches.value_of("input") {
        request.input = input.into();
    }

    if let Some(output) = matches.value_of("output") {
        request.output = Some(output.into());
    }

    if let Some(resolution) = matches.value_of("resolution") {
        request.resolution = resolution.into();
    }

    if let Some(post_processing) = matches.value_of("post-processing") {
        request.post_processing = post_processing.into();
    }

    if let Some(pipeline) = matches.value_of("pipeline") {
        request.pipeline = pipeline.into();
    }

    let response = PipelineExecutor::execute_request(&request);

    if let Response::Success(result) = &response {
        for stage in Stage::ALL {
            let (total, avg_ms) = result.timers.summary(stage);
            info!("{}: {:.3} s total, {:.3} ms avg", stage.name(), total, avg_ms);
        }
    }

    if let (Response::Success(result), Some(path)) = (&response, matches.value_of("timings-csv")) {
        let file = File::create(path).with_context(|| format!("unable to create {}", path))?;
        result.timers.write_csv(BufWriter::new(file))?;
        info!("Timings written to {}", path);
    }

    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
