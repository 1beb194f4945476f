use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = lexgraph_api::Args::parse();

	lexgraph_api::run(args).await
}
