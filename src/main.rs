use std::fs::File;
use std::io::prelude::*;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use env_logger::Builder;
use log::{Level, LevelFilter};
use owo_colors::OwoColorize;
use pakrat_core::data::Endian;
use pakrat_core::stream::ByteReader;
use pakrat_core::util::format_size;
use pakrat_godot::crypto::Key;
use pakrat_godot::engine::EngineGeneration;
use pakrat_godot::{gdscript, identify, pck, project, resource, text};

mod menu;
use menu::{ConfigModules, GdscriptModules, IdentifyModules, Modules, PckModules, ResourceModules};

fn color_level(level: Level) -> String {
    match level {
        Level::Error => level.red().to_string(),
        Level::Warn => level.yellow().to_string(),
        Level::Info => level.green().to_string(),
        Level::Debug => level.blue().to_string(),
        Level::Trace => level.purple().to_string(),
    }
}

const fn level_filter(verbose: usize) -> LevelFilter {
    match verbose {
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        5 => LevelFilter::Trace,
        //default to off
        _ => LevelFilter::Off,
    }
}

/// Writes `contents` to `output`, or stdout if `output` is `None`.
fn emit(output: Option<String>, contents: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, contents).map_err(Into::into),
        None => {
            print!("{contents}");
            Ok(())
        }
    }
}

fn parse_generation(text: &str) -> Result<EngineGeneration> {
    match text.to_ascii_lowercase().as_str() {
        "v2" | "2" => Ok(EngineGeneration::V2),
        "v3" | "3" => Ok(EngineGeneration::V3),
        "v4" | "4" => Ok(EngineGeneration::V4),
        other => bail!("unrecognized engine generation '{other}' (expected v2, v3, or v4)"),
    }
}

fn parse_key(key: Option<String>) -> Result<Option<Key>> {
    key.map(|text| Key::from_hex(&text).context("--key must be 64 hex characters")).transpose()
}

fn cmd_pck_list(params: menu::pck::ListOption) -> Result<()> {
    let key = parse_key(params.key)?;
    let file = File::open(&params.input).context("opening archive")?;
    let archive = pck::ArchiveHandle::open(file, params.input.clone(), key)?;

    let info = archive.info();
    println!(
        "{}: format {}, engine {}.{}.{}, {} entries{}",
        params.input,
        info.format_version,
        info.engine_major,
        info.engine_minor,
        info.engine_patch,
        info.file_count,
        if info.directory_encrypted { ", encrypted directory" } else { "" },
    );
    for entry in archive.entries() {
        println!("  {} ({})", entry.resource_path, format_size(entry.size as usize));
    }
    Ok(())
}

fn cmd_pck_extract(params: menu::pck::ExtractOption) -> Result<()> {
    let key = parse_key(params.key)?;
    let file = File::open(&params.input).context("opening archive")?;
    let mut archive = pck::ArchiveHandle::open(file, params.input.clone(), key)?;

    let root = PathBuf::from(&params.output);
    let count = archive.entries().len();
    for index in 0..count {
        let relative = archive.entries()[index].resource_path.trim_start_matches('/').to_owned();
        let destination = root.join(relative);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::info!("extracting {}", archive.entries()[index].resource_path);
        let mut reader = archive.open_entry(index)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        std::fs::write(&destination, data)?;
    }
    println!("extracted {count} entries to {}", root.display());
    Ok(())
}

fn cmd_pck_verify(params: menu::pck::VerifyOption) -> Result<()> {
    let key = parse_key(params.key)?;
    let file = File::open(&params.input).context("opening archive")?;
    let mut archive = pck::ArchiveHandle::open(file, params.input.clone(), key)?;

    let count = archive.entries().len();
    let mut failures = 0usize;
    for index in 0..count {
        let ok = archive.verify_entry(index)?;
        if !ok {
            failures += 1;
            println!("FAIL {}", archive.entries()[index].resource_path);
        }
    }
    if failures == 0 {
        println!("all {count} entries verified ok");
    } else {
        bail!("{failures} of {count} entries failed checksum verification");
    }
    Ok(())
}

fn cmd_resource_dump(params: menu::resource::DumpOption) -> Result<()> {
    let file = File::open(&params.input).context("opening resource")?;
    let mut reader = ByteReader::new(file, Endian::Little);
    let mut policy = resource::LoadPolicy::FakeLoad { fake_internals: true };
    let graph = resource::load_binary(&mut reader, &mut policy)?;
    let text = text::write_text(&graph)?;
    emit(params.output, &text)
}

fn cmd_gdscript_decompile(params: menu::gdscript::DecompileOption) -> Result<()> {
    let buffer = std::fs::read(&params.input).context("reading bytecode")?;
    let table = gdscript::RevisionTable::with_known_revisions();
    let bytecode = gdscript::parse_bytecode(&buffer, &table)?;
    let source = gdscript::decompile(&table, &bytecode)?;
    emit(params.output, &source)
}

fn cmd_config_convert(params: menu::config::ConvertOption) -> Result<()> {
    let generation = parse_generation(&params.generation)?;
    let buffer = std::fs::read(&params.input).context("reading config")?;

    if buffer.starts_with(b"ECFG") {
        let mut reader = ByteReader::new(std::io::Cursor::new(buffer), Endian::Little);
        let config = project::decode_binary(&mut reader, generation)?;
        let text = project::encode_text(&config, params.minor);
        emit(params.output, &text)
    } else {
        let source = String::from_utf8(buffer).context("config text isn't valid UTF-8")?;
        let config = project::parse_text(&source, generation)?;
        let binary = project::encode_binary(&config)?;
        match params.output {
            Some(path) => std::fs::write(path, binary).map_err(Into::into),
            None => bail!("binary output requires --output, since it isn't printable"),
        }
    }
}

fn cmd_identify_file(params: menu::identify::FileOption) -> Result<()> {
    let data = std::fs::read(&params.input).context("reading file")?;
    match identify::identify_any(&data) {
        Some(info) => println!("{}: {}", params.input, info.info),
        None => bail!("{}: not recognized as any known format", params.input),
    }
    Ok(())
}

fn main() -> Result<()> {
    //Parse command line input
    let args: menu::Pakrat = argp::parse_args_or_exit(argp::DEFAULT);

    // Build up a logger with custom formatting and set it to the verbosity from the command line args
    if args.verbose != 0 {
        Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] {} {}",
                    pakrat_core::time::current_time(), // Use our own time function
                    color_level(record.level()),        // Colored log level
                    record.args()                       // Log message
                )
            })
            .filter(None, level_filter(args.verbose))
            .init();
    }

    match args.nested {
        Modules::Pck(module) => match module.nested {
            PckModules::List(params) => cmd_pck_list(params)?,
            PckModules::Extract(params) => cmd_pck_extract(params)?,
            PckModules::Verify(params) => cmd_pck_verify(params)?,
        },
        Modules::Resource(module) => match module.nested {
            ResourceModules::Dump(params) => cmd_resource_dump(params)?,
        },
        Modules::Gdscript(module) => match module.nested {
            GdscriptModules::Decompile(params) => cmd_gdscript_decompile(params)?,
        },
        Modules::Config(module) => match module.nested {
            ConfigModules::Convert(params) => cmd_config_convert(params)?,
        },
        Modules::Identify(module) => match module.nested {
            IdentifyModules::File(params) => cmd_identify_file(params)?,
        },
    }
    Ok(())
}
