mod application;

mod presentation {
    pub mod cli;
}

fn main() -> resdedup_core::Result<()> {
    application::run()
}
