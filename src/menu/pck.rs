use argp::FromArgs;

use crate::menu::create_submodule;

create_submodule!(
    Pck,
    "Operate on a Godot .pck archive",
    List(ListOption),
    Extract(ExtractOption),
    Verify(VerifyOption)
);

/// List every entry recorded in a .pck archive's directory.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "list")]
#[argp(description = "List every entry in a .pck archive")]
pub struct ListOption {
    #[argp(option, long = "key")]
    #[argp(description = "64-character hex AES-256 key, for archives with an encrypted directory")]
    pub key: Option<String>,

    #[argp(positional)]
    #[argp(description = "Input .pck file, or an executable with one appended to its tail")]
    pub input: String,
}

/// Extract every entry in a .pck archive to a directory, preserving its `res://` layout.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "extract")]
#[argp(description = "Extract every entry in a .pck archive to a directory")]
pub struct ExtractOption {
    #[argp(option, long = "key")]
    #[argp(description = "64-character hex AES-256 key, for archives with an encrypted directory")]
    pub key: Option<String>,

    #[argp(option, short = 'o', long = "output", default = "String::from(\".\")")]
    #[argp(description = "Directory entries are extracted into")]
    pub output: String,

    #[argp(positional)]
    pub input: String,
}

/// Verify the MD5 checksum recorded for every entry in a .pck archive.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "verify")]
#[argp(description = "Verify the MD5 checksum recorded for every entry in a .pck archive")]
pub struct VerifyOption {
    #[argp(option, long = "key")]
    pub key: Option<String>,

    #[argp(positional)]
    pub input: String,
}
