// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("canister")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Canister Contributors")
        .about("Ingestion pipeline for APT-style jailbreak repositories")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Configuration file (TOML)"),
        )
        .subcommand(
            Command::new("init")
                .about("Initialize the Canister database")
                .arg(
                    Arg::new("db_path")
                        .short('d')
                        .long("db-path")
                        .value_name("PATH")
                        .help("Database path (overrides the configuration)"),
                ),
        )
        .subcommand(Command::new("serve").about("Run the control plane server"))
        .subcommand(Command::new("refresh").about("Run one refresh cycle and print its progress"))
        .subcommand(
            Command::new("vercmp")
                .about("Compare two dpkg versions, printing -1, 0 or 1")
                .arg(Arg::new("left").required(true).help("Left version"))
                .arg(Arg::new("right").required(true).help("Right version")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("canister.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
