use argp::FromArgs;

use crate::menu::create_submodule;

create_submodule!(Gdscript, "Operate on compiled GDScript bytecode", Decompile(DecompileOption));

/// Decompile a `.gdc` bytecode file back into GDScript source text.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "decompile")]
#[argp(description = "Decompile compiled GDScript bytecode into source text")]
pub struct DecompileOption {
    #[argp(option, short = 'o', long = "output")]
    #[argp(description = "Output path; defaults to stdout")]
    pub output: Option<String>,

    #[argp(positional)]
    pub input: String,
}
