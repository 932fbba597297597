use std::env;
use std::path::{Path, PathBuf};
use std::process::exit;

use ai5vm::host::Host;
use ai5vm::{game, Config, Vm, VmError};

fn usage() {
    println!("Usage: ai5win --game=<game> [options] [inifile-or-directory]");
    println!("    -h, --help                   Display this message and exit");
    println!("    --game=<game>                Select the game to run");
    println!("    --cg-load-frame-time=<ms>    Frame delay for progressive CG loads");
}

fn usage_error(msg: &str) -> ! {
    usage();
    println!();
    eprintln!("Error: {}", msg);
    exit(1)
}

fn list_games() -> ! {
    usage();
    println!();
    println!("Valid game names are:");
    for (name, description) in game::GAME_IDS.iter() {
        println!("    {:<11} - {}", name, description);
    }
    println!();
    eprintln!("Error: No game specified");
    exit(1)
}

/// Find the INI next to the working directory, preferring the English
/// patch's name.
fn find_ini(dir: &Path) -> Option<PathBuf> {
    for name in ["AI5ENG.INI", "AI5WIN.INI"].iter() {
        let entries = std::fs::read_dir(dir).ok()?;
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
                return Some(entry.path());
            }
        }
    }
    None
}

fn main() {
    env_logger::init();

    let mut game_id: Option<String> = None;
    let mut target: Option<PathBuf> = None;
    let mut progressive_frame_time: Option<u32> = None;

    for arg in env::args().skip(1) {
        if arg == "-h" || arg == "--help" {
            usage();
            return;
        } else if let Some(value) = arg.strip_prefix("--game=") {
            game_id = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--cg-load-frame-time=") {
            match value.parse() {
                Ok(ms) => progressive_frame_time = Some(ms),
                Err(_) => usage_error("Invalid --cg-load-frame-time value"),
            }
        } else if arg.starts_with("--") {
            usage_error(&format!("Unknown option \"{}\"", arg));
        } else if target.is_some() {
            usage_error("Too many arguments");
        } else {
            target = Some(PathBuf::from(arg));
        }
    }

    let game_id = match game_id {
        Some(id) => id,
        None => list_games(),
    };
    let game = match game::lookup(&game_id) {
        Some(game) => game,
        None => usage_error(&format!("Game \"{}\" not supported", game_id)),
    };

    // a directory argument selects the game directory; a file argument
    // names the INI inside it
    let mut ini_path = None;
    if let Some(target) = target {
        if target.is_dir() {
            if let Err(e) = env::set_current_dir(&target) {
                usage_error(&format!("chdir(\"{}\"): {}", target.display(), e));
            }
        } else if target.is_file() {
            let dir = target.parent().map(Path::to_path_buf);
            let base = target.file_name().map(PathBuf::from);
            if let Some(dir) = dir {
                if !dir.as_os_str().is_empty() {
                    if let Err(e) = env::set_current_dir(&dir) {
                        usage_error(&format!("chdir(\"{}\"): {}", dir.display(), e));
                    }
                }
            }
            ini_path = base;
        } else {
            usage_error(&format!(
                "\"{}\" isn't a regular file or directory",
                target.display()
            ));
        }
    }

    let ini_path = match ini_path.or_else(|| find_ini(Path::new("."))) {
        Some(p) => p,
        None => {
            eprintln!("Fatal Error - ai5vm: Couldn't find AI5WIN.INI");
            exit(1);
        }
    };

    let mut config = match Config::load(&ini_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Fatal Error - ai5vm: {}", e);
            exit(1);
        }
    };
    config.apply_default_names();

    let title = match &config.title {
        Some(t) => format!("{} - ai5vm", t),
        None => String::from("ai5vm"),
    };
    let (view_w, view_h) = (game.surface_sizes[0].0 as usize, game.surface_sizes[0].1 as usize);
    let host = match Host::new(&title, view_w, view_h) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Fatal Error - ai5vm: {}", e);
            exit(1);
        }
    };

    let font_path = config.font_path.clone();
    let start_mes = config.start_mes.clone();
    let mut vm = Vm::new(game, config, Some(host));
    if let Some(ms) = progressive_frame_time {
        vm.gfx.progressive_frame_time = ms;
    }
    if let Err(e) = vm.text_init(font_path.as_deref()) {
        if let Some(host) = &vm.host {
            host.error_message(&e.to_string());
        }
        exit(1);
    }

    match vm.run(&start_mes) {
        Ok(()) => {}
        Err(VmError::Quit) => {}
        Err(e) => {
            vm.print_state();
            if let Some(host) = &vm.host {
                host.error_message(&e.to_string());
            } else {
                eprintln!("Fatal Error - ai5vm: {}", e);
            }
            exit(1);
        }
    }
}
