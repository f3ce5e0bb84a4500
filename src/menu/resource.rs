use argp::FromArgs;

use crate::menu::create_submodule;

create_submodule!(Resource, "Operate on a Godot binary resource or scene", Dump(DumpOption));

/// Decode a binary `.res`/`.scn` and print its equivalent `.tres`/`.tscn` text.
///
/// External resources are loaded with `FakeLoad`, since the CLI has no project tree to resolve
/// dependencies against.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "dump")]
#[argp(description = "Decode a binary .res/.scn and print its equivalent .tres/.tscn text")]
pub struct DumpOption {
    #[argp(option, short = 'o', long = "output")]
    #[argp(description = "Output path; defaults to stdout")]
    pub output: Option<String>,

    #[argp(positional)]
    pub input: String,
}
