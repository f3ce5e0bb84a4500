use argp::FromArgs;

pub mod config;
pub use config::ConfigModules;
use config::ConfigOption;
pub mod gdscript;
pub use gdscript::GdscriptModules;
use gdscript::GdscriptOption;
pub mod identify;
pub use identify::IdentifyModules;
use identify::IdentifyOption;
pub mod pck;
pub use pck::PckModules;
use pck::PckOption;
pub mod resource;
pub use resource::ResourceModules;
use resource::ResourceOption;

/// Top-level command
#[derive(FromArgs, PartialEq, Debug)]
#[argp(description = "A reverse-engineering toolkit for Godot .pck archives.")]
pub struct Pakrat {
    #[argp(option, short = 'v', global, default = "0")]
    #[argp(
        description = "Logging level (0 = Off, 1 = Error, 2 = Warn, 3 = Info, 4 = Debug, 5 = Trace)"
    )]
    pub verbose: usize,

    #[argp(subcommand)]
    pub nested: Modules,
}

/// These are all the "modules" that PakRat supports via command line.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
#[non_exhaustive]
pub enum Modules {
    Pck(PckOption),
    Resource(ResourceOption),
    Gdscript(GdscriptOption),
    Config(ConfigOption),
    Identify(IdentifyOption),
}

// Some interaction with argp/argh's derives breaks doc comment macro expansion, so I can't use
// `#[doc = concat!("", stringify!($module_str), "")]`
macro_rules! create_submodule {
    ($module_name:ident, $module_description:expr, $( $submodule_name:ident($submodule_type:ty) ),* ) => {
        use paste::paste;
        paste! {
            // This is the command for the `$module_str` module.
            #[derive(FromArgs, PartialEq, Debug)]
            #[argp(subcommand, name = $module_name:lower)]
            #[argp(description = $module_description)]
            pub struct [<$module_name Option>] {
                #[argp(subcommand)]
                pub nested: [<$module_name Modules>],
            }

            // These are all supported operations within `$module_str`.
            #[derive(FromArgs, PartialEq, Debug)]
            #[argp(subcommand)]
            #[non_exhaustive]
            pub enum [<$module_name Modules>] {
                $( $submodule_name($submodule_type) ),*
            }
        }
    };
}
pub(crate) use create_submodule;
