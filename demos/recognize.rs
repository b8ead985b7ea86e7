use std::error::Error;
use std::env::args;
use std::process;
use std::time::Instant;

use glyph_lpr::config::LprConfig;
use glyph_lpr::Lpr;

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
    let img = image::open(path)?;
    let before = Instant::now();
    let res = lpr.recognize(&img)?;
    let speed = before.elapsed().as_millis();
    println!("res: {}, failures: {}, speed: {} ms", res.text, res.failures(), speed);
    Ok(())
}
