// build.rs
//! Build script for generating the appcatalog man page
//!
//! The CLI is rebuilt here with the clap builder API because build scripts
//! cannot import from the crate they build.

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .global(true)
        .help("Configuration file (defaults to ./appcatalog.toml when present)")
}

fn apps_dir_arg() -> Arg {
    Arg::new("apps_dir")
        .long("apps-dir")
        .global(true)
        .help("Directory holding one subdirectory per app record")
}

fn output_dir_arg() -> Arg {
    Arg::new("output_dir")
        .long("output-dir")
        .global(true)
        .help("Directory the platform trees are written under")
}

fn verbose_arg() -> Arg {
    Arg::new("verbose")
        .short('v')
        .long("verbose")
        .global(true)
        .action(ArgAction::SetTrue)
        .help("Enable debug logging")
}

fn build_cli() -> Command {
    Command::new("appcatalog")
        .version(env!("CARGO_PKG_VERSION"))
        .author("appcatalog Contributors")
        .about("Convert a universal app catalog into self-hosting platform stores")
        .subcommand_required(false)
        .arg(config_arg())
        .arg(apps_dir_arg())
        .arg(output_dir_arg())
        .arg(verbose_arg())
        .subcommand(
            Command::new("convert")
                .about("Convert app records into platform formats")
                .arg(Arg::new("app").help("Convert only this app (directory name under the apps directory)"))
                .arg(
                    Arg::new("platform")
                        .short('p')
                        .long("platform")
                        .default_value("all")
                        .help("Comma-separated platforms, or \"all\""),
                )
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Report what would be written without touching the output tree"),
                )
                .arg(
                    Arg::new("offline")
                        .long("offline")
                        .action(ArgAction::SetTrue)
                        .help("Do not download icons; use generated placeholders"),
                ),
        )
        .subcommand(
            Command::new("list").about("List app records and the platforms each one supports"),
        )
        .subcommand(Command::new("platforms").about("List supported target platforms"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=OUT_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = out_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("appcatalog.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
