//! Heap sizing knobs: a handful of byte-size fields with sane defaults,
//! overridable from the command line.

/// The parser is out of scope for this crate (spec.md §1); a front end
/// that wants `_LoadFile:` to do anything installs one of these, turning
/// source text into the `ast::Script` the interpreter already knows how
/// to run. Left `None` by default, in which case `_LoadFile:` is a
/// runtime error rather than a link-time dependency on a parser.
pub type ScriptLoader = fn(&str) -> Result<crate::ast::Script, String>;

#[derive(Debug, Clone, structopt::StructOpt)]
pub struct Config {
    /// Size in bytes of each young-generation semispace (eden is the same
    /// size as a single survivor space).
    #[structopt(long, default_value = "1048576")]
    pub young_space_size: usize,

    /// Initial size in bytes of the old generation. The old generation
    /// grows on demand, so this is a starting point rather than a cap.
    #[structopt(long, default_value = "4194304")]
    pub old_space_size: usize,

    /// Number of minor collections a young object survives before it is
    /// promoted into the old generation.
    #[structopt(long, default_value = "3")]
    pub promotion_age: u8,

    /// Maximum depth of the activation stack before a stack-overflow
    /// runtime error is raised.
    #[structopt(long, default_value = "2048")]
    pub max_activation_depth: usize,

    /// Hook `_LoadFile:` parses nested scripts through. Not a CLI flag:
    /// there is no way to name a function pointer on the command line, so
    /// the binary driver wires this up itself before running a script.
    #[structopt(skip)]
    pub script_loader: Option<ScriptLoader>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            young_space_size: 1024 * 1024,
            old_space_size: 4 * 1024 * 1024,
            promotion_age: 3,
            max_activation_depth: 2048,
            script_loader: None,
        }
    }
}
