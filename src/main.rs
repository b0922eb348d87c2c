use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use recall::card;
use recall::clock::{Clock, SystemClock};
use recall::config::Config;
use recall::service::FlashcardService;
use recall::store::Store;
use recall::{logging, web};

fn usage() -> ! {
    eprintln!("Usage: recall <command> [args...] [--data FILE]");
    eprintln!("Commands:");
    eprintln!("  serve [-p PORT]         Start the JSON API (default port 3000)");
    eprintln!("  drill                   Review due cards in the terminal");
    eprintln!("  import <paths...>       Add cards from CSV files or directories");
    eprintln!("  export <file.csv>       Write all cards to a CSV file");
    std::process::exit(1);
}

fn main() {
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let mut config = Config::from_env();
    let rest = parse_common_args(&args[2..], &mut config);
    logging::init_tracing(&config.log_level);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = match Store::open(&config.data_file, clock.clone()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let service = Arc::new(FlashcardService::new(Arc::new(store), clock));

    match args[1].as_str() {
        "serve" => {
            let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
                eprintln!("Failed to start runtime: {e}");
                std::process::exit(1);
            });
            if let Err(e) = runtime.block_on(web::serve(service, &config)) {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        "drill" => drill(&service),
        "import" => {
            if rest.is_empty() {
                eprintln!("Usage: recall import <paths...>");
                std::process::exit(1);
            }
            import(&service, &rest);
        }
        "export" => {
            let [target] = rest.as_slice() else {
                eprintln!("Usage: recall export <file.csv>");
                std::process::exit(1);
            };
            export(&service, &PathBuf::from(target));
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            usage();
        }
    }
}

/// Applies `-p PORT` and `--data FILE` to `config`; returns the remaining
/// positional arguments.
fn parse_common_args(args: &[String], config: &mut Config) -> Vec<String> {
    let mut rest = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-p" if i + 1 < args.len() => {
                config.port = args[i + 1].parse().unwrap_or_else(|_| {
                    eprintln!("Invalid port: {}", args[i + 1]);
                    std::process::exit(1);
                });
                i += 2;
            }
            "--data" if i + 1 < args.len() => {
                config.data_file = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            _ => {
                rest.push(args[i].clone());
                i += 1;
            }
        }
    }
    rest
}

fn import(service: &FlashcardService, paths: &[String]) {
    let files = card::discover_files(paths);
    if files.is_empty() {
        eprintln!("No CSV files found.");
        std::process::exit(1);
    }

    let mut added = 0usize;
    for file in &files {
        let rows = match card::load_csv(file) {
            Ok(rows) => rows,
            Err(e) => {
                eprintln!("Warning: {e}");
                continue;
            }
        };
        for (line, row) in rows.into_iter().enumerate() {
            match service.create_flashcard(row) {
                Ok(_) => added += 1,
                Err(e) => eprintln!("Skipping {} row {}: {e}", file.display(), line + 2),
            }
        }
    }
    println!("Imported {added} cards from {} files.", files.len());
}

fn export(service: &FlashcardService, target: &PathBuf) {
    let cards = match service.list_flashcards() {
        Ok(list) => list.flashcards,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = card::save_csv(target, &cards) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    println!("Exported {} cards to {}.", cards.len(), target.display());
}

fn drill(service: &FlashcardService) {
    let due = match service.due_flashcards() {
        Ok(due) => due,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if due.is_empty() {
        println!("No cards due for review.");
        return;
    }
    println!("{} cards due for review.\n", due.len());

    let session = match service.start_session() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let mut buf = String::new();

    for (i, card) in due.iter().enumerate() {
        println!("[{}/{}] {}", i + 1, due.len(), card.tags.join(", "));
        println!();
        println!("{}", card.question);
        println!();

        print!("Press Enter to reveal...");
        let _ = io::stdout().flush();
        buf.clear();
        if stdin.read_line(&mut buf).unwrap_or(0) == 0 {
            break;
        }

        println!("{}", card.answer);
        println!();

        let quality = loop {
            print!("Rate 0-5 (0=blackout, 3=hard recall, 5=perfect): ");
            let _ = io::stdout().flush();
            buf.clear();
            if stdin.read_line(&mut buf).unwrap_or(0) == 0 {
                return finish(service, &session.id);
            }
            if let Ok(n) = buf.trim().parse::<i64>()
                && (0..=5).contains(&n)
            {
                break n;
            }
            println!("Please enter a number from 0 to 5.");
        };

        match service.review_flashcard(&card.id, quality) {
            Ok(result) => {
                println!("{}", result.message);
                if let Err(e) = service.record_review(&session.id, quality >= 3) {
                    eprintln!("Warning: {e}");
                }
            }
            Err(e) => eprintln!("Error: {e}"),
        }
        println!();
    }

    finish(service, &session.id);
}

fn finish(service: &FlashcardService, session_id: &str) {
    match service.end_session(session_id) {
        Ok(session) => {
            println!("Session complete!");
            println!(
                "  Reviewed: {}, Correct: {}",
                session.cards_reviewed, session.cards_correct
            );
        }
        Err(e) => eprintln!("Error: {e}"),
    }
}
