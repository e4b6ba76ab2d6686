use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use tracing::{info, warn};

use hollywood_cut::config::CONFIG;
use hollywood_cut::prompt::{self, ASPECT_RATIO_PRESETS, DEPTH_OF_FIELD_PRESETS};
use hollywood_cut::state::save_jpeg;
use hollywood_cut::utils::logging::init_logging;
use hollywood_cut::{
    ApiKey, CredentialStore, GenerationOrchestrator, GenerationStatus, ImageData, PromptTemplate,
    SceneParameters, Studio,
};

#[derive(Debug, Default, PartialEq)]
struct SceneArgs {
    movie_name: Option<String>,
    aspect_ratio: Option<String>,
    depth_of_field: Option<String>,
    image: Option<PathBuf>,
    quantity: Option<u32>,
    prompt_file: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
enum Command {
    Login {
        key: String,
    },
    Logout,
    Presets,
    Prompt(SceneArgs),
    Generate {
        scene: SceneArgs,
        out: PathBuf,
        select: usize,
        save_all: bool,
        edit: Option<String>,
    },
    Edit {
        image: PathBuf,
        instruction: String,
        out: PathBuf,
    },
    Poster {
        movie_name: String,
        out: PathBuf,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::Logout => "logout",
            Command::Presets => "presets",
            Command::Prompt(_) => "prompt",
            Command::Generate { .. } => "generate",
            Command::Edit { .. } => "edit",
            Command::Poster { .. } => "poster",
        }
    }
}

fn usage() -> &'static str {
    "Usage:
  hollywood-cut login --key <API_KEY>
  hollywood-cut logout
  hollywood-cut presets
  hollywood-cut prompt [--movie <name>] [--ratio <w:h>] [--dof <f/x>]
  hollywood-cut generate [--image <path>] [--movie <name>] [--ratio <w:h>] [--dof <f/x>] [--quantity <n>] [--prompt-file <path>] [--select <n>] [--all] [--edit <instruction>] [--out <dir>]
  hollywood-cut edit --image <path> --instruction <text> [--out <dir>]
  hollywood-cut poster --movie <name> [--out <dir>]"
}

fn take_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.get(1).map(|value| value.as_str()) else {
        return Err(anyhow!(usage()));
    };

    let mut scene = SceneArgs::default();
    let mut out = PathBuf::from(".");
    let mut select = 1usize;
    let mut save_all = false;
    let mut edit = None;
    let mut key = None;
    let mut instruction = None;

    let mut index = 2;
    while index < args.len() {
        let flag = args[index].as_str();
        match flag {
            "--key" => key = Some(take_value(args, &mut index, flag)?.to_string()),
            "--movie" => scene.movie_name = Some(take_value(args, &mut index, flag)?.to_string()),
            "--ratio" => {
                scene.aspect_ratio = Some(take_value(args, &mut index, flag)?.to_string())
            }
            "--dof" => {
                scene.depth_of_field = Some(take_value(args, &mut index, flag)?.to_string())
            }
            "--image" => scene.image = Some(PathBuf::from(take_value(args, &mut index, flag)?)),
            "--prompt-file" => {
                scene.prompt_file = Some(PathBuf::from(take_value(args, &mut index, flag)?))
            }
            "--quantity" => {
                let value = take_value(args, &mut index, flag)?;
                scene.quantity = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| anyhow!("Invalid --quantity value: {value}"))?,
                );
            }
            "--select" => {
                let value = take_value(args, &mut index, flag)?;
                select = value
                    .parse::<usize>()
                    .ok()
                    .filter(|value| *value >= 1)
                    .ok_or_else(|| anyhow!("Invalid --select value: {value}"))?;
            }
            "--all" => save_all = true,
            "--edit" => edit = Some(take_value(args, &mut index, flag)?.to_string()),
            "--instruction" => {
                instruction = Some(take_value(args, &mut index, flag)?.to_string())
            }
            "--out" => out = PathBuf::from(take_value(args, &mut index, flag)?),
            "--help" | "-h" => return Err(anyhow!(usage())),
            other => return Err(anyhow!("Unknown argument: {other}\n{}", usage())),
        }
        index += 1;
    }

    match command {
        "login" => Ok(Command::Login {
            key: key.ok_or_else(|| anyhow!("--key is required"))?,
        }),
        "logout" => Ok(Command::Logout),
        "presets" => Ok(Command::Presets),
        "prompt" => Ok(Command::Prompt(scene)),
        "generate" => Ok(Command::Generate {
            scene,
            out,
            select: select - 1,
            save_all,
            edit,
        }),
        "edit" => Ok(Command::Edit {
            image: scene.image.ok_or_else(|| anyhow!("--image is required"))?,
            instruction: instruction.ok_or_else(|| anyhow!("--instruction is required"))?,
            out,
        }),
        "poster" => Ok(Command::Poster {
            movie_name: scene
                .movie_name
                .ok_or_else(|| anyhow!("--movie is required"))?,
            out,
        }),
        "--help" | "-h" | "help" => Err(anyhow!(usage())),
        other => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

fn scene_parameters(scene: &SceneArgs) -> Result<SceneParameters> {
    let reference_image = match &scene.image {
        Some(path) => Some(
            ImageData::load(path)
                .with_context(|| format!("Failed to load reference image {}", path.display()))?,
        ),
        None => None,
    };
    let custom_prompt = match &scene.prompt_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt file {}", path.display()))?,
        ),
        None => None,
    };
    Ok(SceneParameters {
        movie_name: scene.movie_name.clone(),
        aspect_ratio: scene.aspect_ratio.clone(),
        depth_of_field: scene.depth_of_field.clone(),
        reference_image,
        quantity: scene.quantity.unwrap_or(1),
        custom_prompt,
    })
}

/// Stored session key first, then `GEMINI_API_KEY`.
fn resolve_api_key(store: &CredentialStore) -> Result<ApiKey> {
    if let Some(key) = store.load()? {
        return Ok(key);
    }
    ApiKey::parse(&CONFIG.gemini_api_key).map_err(|err| {
        anyhow!("{err}. Run `hollywood-cut login --key <API_KEY>` or set GEMINI_API_KEY.")
    })
}

fn build_orchestrator(store: &CredentialStore) -> Result<Arc<GenerationOrchestrator>> {
    let api_key = resolve_api_key(store)?;
    let provider_config = CONFIG.provider_config(api_key);
    let orchestrator = GenerationOrchestrator::from_config(&provider_config)
        .context("Failed to build HTTP client")?;
    Ok(Arc::new(orchestrator))
}

fn report_status(status: &GenerationStatus) {
    match status {
        GenerationStatus::Generated { provider, model } => {
            println!("Generated with {provider}:{model}");
        }
        GenerationStatus::Degraded { reason, .. } => {
            println!("Providers unavailable, returning your input unchanged ({reason})");
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let store = CredentialStore::new(&CONFIG.session_file);

    match command {
        Command::Login { key } => {
            let key = ApiKey::parse(&key)?;
            store.save(&key)?;
            println!("API key saved to {}", store.path().display());
        }
        Command::Logout => {
            store.clear()?;
            println!("API key cleared");
        }
        Command::Presets => {
            println!("Aspect ratios:");
            for (label, value) in ASPECT_RATIO_PRESETS {
                println!("  {value:<6} {label}");
            }
            println!("Depth of field:");
            for (label, value) in DEPTH_OF_FIELD_PRESETS {
                println!("  {value:<6} {label}");
            }
        }
        Command::Prompt(scene) => {
            let params = scene_parameters(&scene)?;
            println!("{}", prompt::render(&PromptTemplate::set_photo(), &params));
        }
        Command::Generate {
            scene,
            out,
            select,
            save_all,
            edit,
        } => {
            let params = scene_parameters(&scene)?;
            let studio = Studio::new(
                build_orchestrator(&store)?,
                PromptTemplate::set_photo(),
                CONFIG.max_quantity,
            );
            let result = studio.generate(&params).await?;
            report_status(result.status());
            if result.is_empty() {
                println!("No images to save");
                return Ok(());
            }
            if !studio.select(select) {
                warn!(
                    "Selection {} out of range for {} image(s); keeping the first",
                    select + 1,
                    result.len()
                );
            }
            if let Some(instruction) = edit {
                let edited = studio.edit_selected(&instruction).await?;
                report_status(&edited.status);
            }
            let paths = if save_all {
                studio.save_all(&out)?
            } else {
                vec![studio.save_selected(&out)?]
            };
            for path in paths {
                println!("{}", path.display());
            }
        }
        Command::Edit {
            image,
            instruction,
            out,
        } => {
            let original = ImageData::load(&image)
                .with_context(|| format!("Failed to load image {}", image.display()))?;
            let orchestrator = build_orchestrator(&store)?;
            let edited = orchestrator.edit(&original, &instruction).await;
            report_status(&edited.status);
            let path = out.join(hollywood_cut::config::OUTPUT_FILENAME);
            save_jpeg(&edited.image, &path)?;
            println!("{}", path.display());
        }
        Command::Poster { movie_name, out } => {
            let orchestrator = build_orchestrator(&store)?;
            match orchestrator.poster_backdrop(&movie_name).await {
                Some(image) => {
                    let path = out.join("poster.jpg");
                    save_jpeg(&image, &path)?;
                    println!("{}", path.display());
                }
                None => println!("Poster backdrop unavailable"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guards = init_logging(&CONFIG.log_level, &CONFIG.logs_dir);

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;
    info!("Running hollywood-cut {}", command.name());
    run(command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("hollywood-cut")
            .chain(values.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parses_generate_flags() {
        let command = parse_args(&args(&[
            "generate",
            "--movie",
            "Inception",
            "--ratio",
            "9:16",
            "--quantity",
            "2",
            "--select",
            "2",
            "--all",
            "--out",
            "shots",
        ]))
        .unwrap();
        assert_eq!(
            command,
            Command::Generate {
                scene: SceneArgs {
                    movie_name: Some("Inception".to_string()),
                    aspect_ratio: Some("9:16".to_string()),
                    quantity: Some(2),
                    ..Default::default()
                },
                out: PathBuf::from("shots"),
                select: 1,
                save_all: true,
                edit: None,
            }
        );
    }

    #[test]
    fn edit_requires_image_and_instruction() {
        assert!(parse_args(&args(&["edit", "--image", "a.jpg"])).is_err());
        assert!(parse_args(&args(&["edit", "--instruction", "rain"])).is_err());
        assert!(parse_args(&args(&["edit", "--image", "a.jpg", "--instruction", "rain"])).is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_args(&args(&["generate", "--quantity", "many"])).is_err());
        assert!(parse_args(&args(&["generate", "--select", "0"])).is_err());
        assert!(parse_args(&args(&["generate", "--movie"])).is_err());
        assert!(parse_args(&args(&["dance"])).is_err());
        assert!(parse_args(&args(&[])).is_err());
    }

    #[test]
    fn login_needs_key() {
        assert!(parse_args(&args(&["login"])).is_err());
        assert_eq!(
            parse_args(&args(&["login", "--key", "abc"])).unwrap(),
            Command::Login {
                key: "abc".to_string()
            }
        );
    }
}
