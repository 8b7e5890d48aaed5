fn main() -> anyhow::Result<()> {
    recruit_board::cli::run()
}
