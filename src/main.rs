//! The `selfvm` binary: a thin driver around the library crate. It is
//! deliberately not a general front end — spec.md §1 puts lexing and
//! parsing out of this crate's scope, so this binary only understands the
//! tiny S-expression-ish bootstrap format in `reader` (see that module's
//! doc comment for the grammar). Its job is to exercise the engine end to
//! end: load a script from a file or `-e` string, run it, and print the
//! result or a formatted runtime-error trace.
//!
//! Single-threaded, like the library it drives: nothing here spawns a
//! thread or schedules async work.

mod reader;

use selfvm::ast::Script;
use selfvm::config::Config;
use selfvm::value::Value;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "selfvm", about = "Runtime core for a prototype-based, message-passing object language")]
struct Opt {
    /// Script file in the bootstrap S-expression format (see `selfvm::reader`
    /// in the source for its grammar). Omit together with `--eval` to run
    /// the built-in demonstration script.
    #[structopt(name = "FILE", parse(from_os_str))]
    file: Option<PathBuf>,

    /// Evaluate this string instead of reading a file.
    #[structopt(short = "e", long = "eval")]
    eval: Option<String>,

    #[structopt(flatten)]
    config: Config,
}

fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    let (source, file_name): (String, String) = if let Some(expr) = opt.eval {
        (expr, "<eval>".to_string())
    } else if let Some(path) = &opt.file {
        match std::fs::read_to_string(path) {
            Ok(s) => (s, path.display().to_string()),
            Err(e) => {
                eprintln!("selfvm: could not read {}: {}", path.display(), e);
                std::process::exit(2);
            }
        }
    } else {
        (demo_source(), "<demo>".to_string())
    };

    let mut config = opt.config;
    config.script_loader = Some(reader::parse);
    let mut vm = selfvm::prepare_world(config);

    let script: Rc<Script> = match reader::parse(&source) {
        Ok(s) => Rc::new(Script { name: Arc::from(file_name.as_str()), ..s }),
        Err(e) => {
            eprintln!("{}: parse error: {}", file_name, e);
            std::process::exit(2);
        }
    };

    let lobby = vm.state.lobby;
    match selfvm::execute_script(&mut vm, &script, lobby) {
        Ok(value) => {
            println!("{}", format_result(value));
            std::process::exit(0);
        }
        Err(e) => {
            eprint!("{}", e.format(&file_name));
            std::process::exit(1);
        }
    }
}

fn format_result(value: Value) -> String {
    if value.is_int() {
        value.as_int().to_string()
    } else if value.is_float() {
        value.as_float().to_string()
    } else {
        format!("{:?}", value)
    }
}

/// Runs with no arguments: builds `(| x = 3. y = 4 |) x` (spec.md §8
/// scenario 1) directly in the bootstrap format and evaluates it.
fn demo_source() -> String {
    "(send (obj ((const x 3) (const y 4))) x)".to_string()
}
