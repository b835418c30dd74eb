fn main() -> anyhow::Result<()> {
    mergecast::logging::init_tracing();
    mergecast::cli::run()
}
