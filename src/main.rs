mod broadcast;
mod builtins;
mod config;
mod error;
mod executor;
mod multiplexer;
mod numbered_pipe;
mod parser;
mod reaper;
mod session;
mod status;
mod tokenizer;
mod user_pipe;

fn main() {
    let config = config::ServerConfig::from_args(std::env::args());

    let listener = match multiplexer::bind_listener(config.port) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("npshelld: failed to bind port {}: {e}", config.port);
            std::process::exit(1);
        }
    };

    eprintln!("npshelld: listening on port {}", config.port);
    multiplexer::run(&listener);
}
