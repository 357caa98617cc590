fn main() -> anyhow::Result<()> {
    digest_cli::cli::run()
}
