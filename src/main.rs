use clap::{ Arg, App, ArgMatches };
use env_logger::Env;

use std::error::Error;

use glyph_lpr::classifier::{ serial, ClassifierConfig, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS };
use glyph_lpr::config::{ FailurePolicy, LprConfig, SegmenterConfig, ThresholdPolicy };
use glyph_lpr::{ CharacterOutcome, Lpr };


fn main() -> Result<(), Box<dyn Error>>{
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = app().get_matches();
    let file_name = matches.value_of("INPUT").ok_or("image is required")?;
    let config = build_config(&matches)?;

    let mut lpr = Lpr::new(&config)?;
    let reading = lpr.recognize_file(file_name)?;

    for (i, c) in reading.characters.iter().enumerate() {
        match &c.outcome {
            CharacterOutcome::Recognized { character, prediction } => {
                println!("{}: {} score {:.3} at {:?}", i, character, prediction.score, c.bbox);
            }
            CharacterOutcome::Failed(reason) => println!("{}: failed ({}) at {:?}", i, reason, c.bbox),
        }
    }
    println!("plate: {}", reading.text);
    if reading.failures() > 0 {
        println!("{} of {} characters failed", reading.failures(), reading.characters.len());
    }

    if let Some(path) = matches.value_of("annotate") {
        reading.annotate().save(path)?;
    }
    Ok(())
}

fn app() -> App<'static, 'static> {
    App::new("glyph-lpr")
                    .version("0.1.0")
                    .author("kingrong")
                    .about("Segments license plate characters and classifies them one by one")
                    .arg(Arg::with_name("INPUT")
                        .help("image file with license plate")
                        .required(true)
                        .index(1))
                    .arg(Arg::with_name("config")
                        .long("config")
                        .value_name("FILE")
                        .help("JSON pipeline configuration")
                        .takes_value(true))
                    .arg(Arg::with_name("url")
                        .long("url")
                        .value_name("URL")
                        .help("classify over HTTP at this endpoint")
                        .takes_value(true)
                        .conflicts_with_all(&["serial", "model"]))
                    .arg(Arg::with_name("serial")
                        .long("serial")
                        .value_name("PORT")
                        .help("classify over this serial port")
                        .takes_value(true)
                        .conflicts_with("model"))
                    .arg(Arg::with_name("baud")
                        .long("baud")
                        .value_name("RATE")
                        .help("serial baud rate")
                        .takes_value(true)
                        .requires("serial"))
                    .arg(Arg::with_name("model")
                        .long("model")
                        .value_name("PB")
                        .help("classify in process with a frozen TensorFlow graph")
                        .takes_value(true))
                    .arg(Arg::with_name("input-op")
                        .long("input-op")
                        .value_name("NAME")
                        .help("graph input operation [default: input]")
                        .takes_value(true)
                        .requires("model"))
                    .arg(Arg::with_name("output-op")
                        .long("output-op")
                        .value_name("NAME")
                        .help("graph output operation [default: output]")
                        .takes_value(true)
                        .requires("model"))
                    .arg(Arg::with_name("otsu")
                        .long("otsu")
                        .help("segment with a global Otsu threshold")
                        .conflicts_with("adaptive"))
                    .arg(Arg::with_name("adaptive")
                        .long("adaptive")
                        .help("segment with the close range adaptive threshold preset"))
                    .arg(Arg::with_name("abort-on-error")
                        .long("abort-on-error")
                        .help("fail the plate when one character cannot be classified"))
                    .arg(Arg::with_name("debug-dir")
                        .long("debug-dir")
                        .value_name("DIR")
                        .help("write every glyph bitmap here")
                        .takes_value(true))
                    .arg(Arg::with_name("annotate")
                        .long("annotate")
                        .value_name("FILE")
                        .help("save the plate with candidate boxes drawn")
                        .takes_value(true))
}

/// Config file first, then flags on top.
fn build_config(matches: &ArgMatches) -> Result<LprConfig, Box<dyn Error>> {
    let mut config = match matches.value_of("config") {
        Some(path) => LprConfig::from_json_file(path)?,
        None => LprConfig::default(),
    };

    if let Some(url) = matches.value_of("url") {
        let timeout_ms = match config.classifier {
            ClassifierConfig::Http { timeout_ms, .. } => timeout_ms,
            _ => DEFAULT_TIMEOUT_MS,
        };
        config.classifier = ClassifierConfig::Http { url: url.to_string(), timeout_ms };
    }
    if let Some(port) = matches.value_of("serial") {
        // keep whatever the config file set for the serial link
        let (mut baud_rate, timeout_ms, ready_sentinel, result_prefix) = match &config.classifier {
            ClassifierConfig::Serial { baud_rate, timeout_ms, ready_sentinel, result_prefix, .. } => {
                (*baud_rate, *timeout_ms, ready_sentinel.clone(), result_prefix.clone())
            }
            _ => (DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS,
                  serial::READY_SENTINEL.to_string(), serial::RESULT_PREFIX.to_string()),
        };
        if let Some(baud) = matches.value_of("baud") {
            baud_rate = baud.parse()?;
        }
        config.classifier = ClassifierConfig::Serial {
            port: port.to_string(),
            baud_rate,
            timeout_ms,
            ready_sentinel,
            result_prefix,
        };
    }
    if let Some(model) = matches.value_of("model") {
        config.classifier = ClassifierConfig::Local {
            model: model.into(),
            input_op: matches.value_of("input-op").unwrap_or("input").to_string(),
            output_op: matches.value_of("output-op").unwrap_or("output").to_string(),
        };
    }

    if matches.is_present("otsu") {
        config.segmenter.threshold = ThresholdPolicy::Otsu;
    }
    if matches.is_present("adaptive") {
        config.segmenter = SegmenterConfig::close_range();
    }
    if matches.is_present("abort-on-error") {
        config.failure_policy = FailurePolicy::Abort;
    }
    if let Some(dir) = matches.value_of("debug-dir") {
        config.debug_dir = Some(dir.into());
    }
    config.validate()?;
    Ok(config)
}
