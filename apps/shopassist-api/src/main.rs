use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = shopassist_api::Args::parse();

	shopassist_api::run(args).await
}
