use std::process;

fn main() {
    process::exit(depbuild::cli::run());
}
