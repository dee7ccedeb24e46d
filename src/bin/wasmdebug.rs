use anyhow::{anyhow, Context, Result};
use log::debug;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use structopt::StructOpt;
use wasmdebug_code::layout::{lay_out_module, LayoutOptions};
use wasmdebug_code::{val_type_name, Architecture};
use wasmdebug_debugger::{Config, DebugState, DebuggerId, HandlerId, InstanceId};

#[derive(StructOpt)]
struct Opts {
    /// The wasm binary file
    #[structopt(name = "FILE", parse(from_os_str))]
    filepath: PathBuf,
    /// Architecture to lay out debug traps for: x64 or arm64
    #[structopt(long, parse(try_from_str = parse_arch))]
    arch: Option<Architecture>,
    /// Filename used in the display URL. Defaults to the name of FILE
    #[structopt(long)]
    filename: Option<String>,
    /// Modules with more bytecode than this are not printed as text
    #[structopt(long)]
    text_size_limit: Option<usize>,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Prints the module as text
    #[structopt(name = "text")]
    Text,
    /// Prints the display URL of the module
    #[structopt(name = "url")]
    Url,
    /// Prints the bytecode offsets of the expressions on a line
    #[structopt(name = "lines")]
    Lines {
        #[structopt(short, long)]
        line: u32,
    },
    /// Prints the line and column of a bytecode offset
    #[structopt(name = "location")]
    Location {
        #[structopt(short, long, parse(try_from_str = parse_offset))]
        offset: u32,
    },
    /// Prints the argument, local and result types of a function
    #[structopt(name = "locals")]
    Locals {
        #[structopt(short, long)]
        func: u32,
    },
    /// Applies trap requests and prints every debug trap with its state
    #[structopt(name = "traps")]
    Traps {
        /// Sets a breakpoint at a bytecode offset
        #[structopt(long = "break", parse(try_from_str = parse_offset))]
        breakpoints: Vec<u32>,
        /// Puts a function in step mode
        #[structopt(long = "step")]
        step: Vec<u32>,
        /// Enables frame enter and leave traps
        #[structopt(long)]
        frame_traps: bool,
    },
}

fn parse_arch(arch: &str) -> Result<Architecture> {
    match arch {
        "x64" | "x86_64" => Ok(Architecture::X64),
        "arm64" | "aarch64" => Ok(Architecture::Arm64),
        _ => Err(anyhow!("unknown architecture '{}'", arch)),
    }
}

fn parse_offset(offset: &str) -> Result<u32> {
    if offset.starts_with("0x") {
        let raw = offset.trim_start_matches("0x");
        Ok(u32::from_str_radix(raw, 16)?)
    } else {
        Ok(offset.parse::<u32>()?)
    }
}

fn load_file(filepath: &Path) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut f = std::fs::File::open(filepath)
        .with_context(|| format!("failed to open {}", filepath.display()))?;
    f.read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn run(opts: Opts) -> Result<()> {
    let bytes = load_file(&opts.filepath)?;
    let mut layout = LayoutOptions::default();
    if let Some(arch) = opts.arch {
        layout.arch = arch;
    }
    let filepath = &opts.filepath;
    layout.filename = opts.filename.or_else(|| {
        filepath
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    });
    let code = lay_out_module(&bytes, &layout)?;
    debug!(
        "laid out {} functions in {} bytes",
        code.metadata().function_count(),
        code.segment().len()
    );

    let mut config = Config::default();
    if let Some(limit) = opts.text_size_limit {
        config = config.text_size_limit(limit);
    }
    let mut state = DebugState::with_config(code, Some(Rc::from(bytes)), config);

    match opts.command {
        Command::Text => print!("{}", state.create_text()?),
        Command::Url => println!("{}", state.debug_display_url()),
        Command::Lines { line } => {
            for offset in state.get_line_offsets(line)? {
                println!("{:#x}", offset);
            }
        }
        Command::Location { offset } => match state.get_offset_location(offset)? {
            Some((lineno, column)) => println!("{}:{}", lineno, column),
            None => println!("no location for offset {:#x}", offset),
        },
        Command::Locals { func } => {
            if func >= state.metadata().function_count() {
                return Err(anyhow!("function {} not found", func));
            }
            let (types, args) = state.debug_get_local_types(func)?;
            for (index, ty) in types.iter().enumerate() {
                let role = if index < args { "param" } else { "local" };
                println!("{} {} {}", role, index, val_type_name(*ty));
            }
            println!("result {}", state.debug_get_result_type(func));
        }
        Command::Traps {
            breakpoints,
            step,
            frame_traps,
        } => {
            for offset in breakpoints {
                state.set_breakpoint(offset, DebuggerId(0), InstanceId(0), HandlerId(0))?;
            }
            for func in step {
                if func >= state.metadata().function_count()
                    || !state.metadata().function_code_range(func).is_function()
                {
                    return Err(anyhow!("function {} has no body to step through", func));
                }
                state.increment_step_mode_count(func)?;
            }
            if frame_traps {
                state.adjust_enter_and_leave_frame_traps_state(true);
            }
            let segment = state.code().segment();
            for call_site in &state.metadata().call_sites {
                let return_address = call_site.return_address_offset();
                println!(
                    "{:?} bytecode={:#x} return={:#x} {}",
                    call_site.kind(),
                    call_site.line_or_bytecode(),
                    return_address,
                    if segment.is_trap_armed(return_address as usize) {
                        "armed"
                    } else {
                        "disarmed"
                    }
                );
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("warn"));

    let opts = Opts::from_args();
    run(opts)
}
