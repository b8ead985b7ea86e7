use std::error::Error;
use std::env::args;
use std::process;
use std::time::Instant;
use std::fs;

use glyph_lpr::classifier::Prediction;
use glyph_lpr::config::LprConfig;
use glyph_lpr::{ CharacterOutcome, Lpr };

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let mut args = args();
    args.next();
    let path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("didn't get a image from args");
            process::exit(1);
        }
    };
    let config = match args.next() {
        Some(config) => LprConfig::from_json_file(config)?,
        None => LprConfig::default(),
    };
    let mut lpr = Lpr::new(&config)?;

    let mut speeds = Vec::new();
    let mut scores = Vec::new();
    let mut total_amount = 0;
    let mut complete = 0;
    for item in fs::read_dir(path)?.flatten() {
        let path = item.path();
        match path.extension() {
            Some(ext) if ext == "jpg" || ext == "png" => {}
            _ => continue,
        }
        print!("file: {:?},  ", path);
        let before = Instant::now();
        let res = match lpr.recognize_file(&path) {
            Ok(res) => res,
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };
        let speed = before.elapsed().as_millis();
        total_amount += 1;
        speeds.push(speed);
        for c in &res.characters {
            if let CharacterOutcome::Recognized { prediction: Prediction { score, .. }, .. } = c.outcome {
                scores.push(score);
            }
        }
        if !res.characters.is_empty() && res.failures() == 0 {
            complete += 1;
        }
        println!("res: {}, speed: {}", res.text, speed);
    }
    let average_score = scores.iter().sum::<f32>() / scores.len().max(1) as f32;
    let average_speed = speeds.iter().sum::<u128>() / speeds.len().max(1) as u128;
    println!("total_amount: {}, complete: {}, average_score: {}, average_speed: {}",
        total_amount, complete, average_score, average_speed);
    Ok(())
}
