use log::info;
use siamese_net::{SiameseConfig, run};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = SiameseConfig::default();
    let y = run(&config)?;

    info!("output shape: {:?}", y.shape());
    println!("{y:.4}");
    Ok(())
}
