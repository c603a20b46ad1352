use std::env;
use std::fs::File;
use std::io::prelude::*;
use std::path::PathBuf;
use std::process::exit;

use log::info;

use lurk::io::{StdinInput, StdoutOutput};
use lurk::zmachine::ZMachine;
use lurk::zrand::ZRand;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: lurk <story-file>");
        exit(1);
    }

    let path = PathBuf::from(&args[1]);
    let mut bytes = Vec::new();
    if let Err(e) = File::open(&path).and_then(|mut f| f.read_to_end(&mut bytes)) {
        eprintln!("cannot read {}: {e}", path.display());
        exit(1);
    }

    let mut machine = match ZMachine::new(
        bytes,
        ZRand::new(),
        Box::new(StdinInput),
        Box::new(StdoutOutput),
    ) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            exit(1);
        }
    };

    info!("loaded {}", path.display());
    info!("{}", machine.header);

    match machine.run() {
        Ok(()) => exit(0),
        Err(e) => {
            eprintln!("fatal: {e}");
            exit(1);
        }
    }
}
