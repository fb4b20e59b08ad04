//! `libfed` CLI binary. All logic lives in the library; this is only the
//! process entry point and the exit-code mapping.

#[tokio::main]
async fn main() {
    if let Err(code) = libfed::cli::run().await {
        std::process::exit(code.as_i32());
    }
}
