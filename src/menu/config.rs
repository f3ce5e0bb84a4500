use argp::FromArgs;

use crate::menu::create_submodule;

create_submodule!(
    Config,
    "Operate on Godot project configuration files",
    Convert(ConvertOption)
);

/// Convert a project configuration between its binary `engine.cfb` form and the text
/// `project.godot`/`engine.cfg` form, auto-detecting the input's direction from its magic.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "convert")]
#[argp(description = "Convert engine.cfb <-> project.godot")]
pub struct ConvertOption {
    #[argp(option, long = "generation", default = "String::from(\"v4\")")]
    #[argp(description = "Engine generation assumed for decoding: v2, v3, or v4")]
    pub generation: String,

    #[argp(option, long = "minor", default = "0")]
    #[argp(description = "Engine minor version, used to pick config_version when writing text")]
    pub minor: u32,

    #[argp(option, short = 'o', long = "output")]
    #[argp(description = "Output path; defaults to stdout")]
    pub output: Option<String>,

    #[argp(positional)]
    pub input: String,
}
