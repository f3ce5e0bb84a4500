use argp::FromArgs;

use crate::menu::create_submodule;

create_submodule!(
    Identify,
    "Identify a file by its magic bytes",
    File(FileOption)
);

/// Identify a file by peeking at its leading magic bytes, without committing to a full parse.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "file")]
#[argp(description = "Report the format a file's magic bytes identify as")]
pub struct FileOption {
    #[argp(positional)]
    pub input: String,
}
