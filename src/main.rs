use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sketchforge::rendering::RasterOptions;
use sketchforge::{
    BasicCredentials, Inference, LocalService, MemoryCanvas, OpenAiClient, ProcessKey, ServiceClient,
    ServiceConfig, ShapeId, SynthConfig, Synthesizer,
};

#[derive(Parser)]
#[command(name = "sketchforge", version, about = "Turn wireframes into runnable HTML pages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the local synthesis service
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT")]
        port: Option<u16>,
        /// Interface to bind; anything but loopback needs basic auth
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Synthesize a page from a scene file
    Synthesize {
        /// Scene JSON (shapes + selection)
        scene: PathBuf,
        /// Comma-separated shape ids to select; defaults to the scene's
        /// selection, or every shape when that is empty
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
        /// Key used when OPENAI_API_KEY is not set
        #[arg(long)]
        api_key: Option<String>,
        /// Go through a running local service instead of calling the model directly
        #[arg(long)]
        service: Option<String>,
        /// Basic auth for --service, as user:password
        #[arg(long, requires = "service")]
        service_auth: Option<String>,
        /// Rasterize the way this browser would
        #[arg(long, default_value = "")]
        user_agent: String,
        /// Write the page here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Persist the canvas, including the new page shape
        #[arg(long)]
        save_scene: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Serve { port, host } => serve(port, &host).await,
        Command::Synthesize {
            scene,
            select,
            api_key,
            service,
            service_auth,
            user_agent,
            out,
            save_scene,
        } => {
            let canvas = Arc::new(
                MemoryCanvas::load(&scene).with_context(|| format!("loading {}", scene.display()))?,
            );
            if !select.is_empty() {
                let ids: Vec<ShapeId> = select.iter().map(|s| ShapeId::from(s.as_str())).collect();
                canvas.select(&ids);
            } else if canvas.scene().selection.is_empty() {
                canvas.select_all();
            }

            let config = SynthConfig::from_env();
            let inference: Arc<dyn Inference> = match service {
                Some(url) => {
                    let mut client = ServiceClient::new(&url)?;
                    if let Some(pair) = service_auth {
                        client = client.with_basic_auth(parse_credentials(&pair)?);
                    }
                    Arc::new(client)
                }
                None => Arc::new(OpenAiClient::new(config.clone(), ProcessKey::Environment)?),
            };

            let synth = Synthesizer::new(canvas.clone(), inference, config)
                .with_raster_options(RasterOptions::for_user_agent(&user_agent));
            let id = synth.synthesize_selection(api_key.as_deref()).await?;

            let markup = canvas
                .get(&id)
                .and_then(|shape| shape.preview().and_then(|p| p.markup()).map(str::to_string))
                .context("committed page has no markup")?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &markup).with_context(|| format!("writing {}", path.display()))?;
                    log::info!("wrote {} ({} bytes)", path.display(), markup.len());
                }
                None => println!("{markup}"),
            }
            if let Some(path) = save_scene {
                canvas.save(&path)?;
            }
            Ok(())
        }
    }
}

async fn serve(port: Option<u16>, host: &str) -> anyhow::Result<()> {
    let mut config = ServiceConfig::from_env()?;
    config.addr.set_ip(host.parse().with_context(|| format!("invalid host {host:?}"))?);
    if let Some(port) = port {
        config.addr.set_port(port);
    }
    LocalService::bind(config)?.run().await?;
    Ok(())
}

fn parse_credentials(pair: &str) -> anyhow::Result<BasicCredentials> {
    match pair.split_once(':') {
        Some((username, password)) if !username.is_empty() => Ok(BasicCredentials {
            username: username.to_string(),
            password: password.to_string(),
        }),
        _ => bail!("--service-auth must look like user:password"),
    }
}
