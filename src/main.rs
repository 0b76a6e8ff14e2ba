fn main() -> anyhow::Result<()> {
    radorder::run()
}
