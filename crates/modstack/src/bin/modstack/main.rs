mod cli;

use modstack::project::Project;
use serde_json::Value;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("MODSTACK_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Compile(compile_cli) => compile(compile_cli),
        cli::Command::Validate(validate_cli) => validate(validate_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn compile(cli: cli::CompileCommand) -> anyhow::Result<()> {
    let project = load(&cli.project)?;

    let errors = project.validate(&cli.module)?;
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("{error}");
        }
        anyhow::bail!("module {} has {} validation error(s)", cli.module, errors.len());
    }

    let compiled = project.compile(&cli.module)?;
    output(&cli.output, &compiled)?;
    Ok(())
}

pub fn validate(cli: cli::ValidateCommand) -> anyhow::Result<()> {
    let project = load(&cli.project)?;

    let errors = project.validate_all()?;
    if !errors.is_empty() {
        return Err(errors.into());
    }

    eprintln!("all modules valid");
    Ok(())
}

fn load(project: &cli::ProjectArgs) -> anyhow::Result<Project> {
    let project = Project::from_manifest(&project.manifest)?;
    anyhow::ensure!(project.module_names().next().is_some(), "No modules loaded");
    Ok(project)
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (modstack-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let project = load(&cli.project)?;

    match cli.command {
        Documents => {
            for (module, document) in project.extend().documents().modules() {
                match &document.location {
                    Some(location) => println!("{module} ({})", location.display()),
                    None => println!("{module}"),
                }
                println!("{}", serde_json::to_string_pretty(&document.document)?);
            }
        }
        Extend => {
            for (id, merged) in project.extend().resource_map() {
                println!("{id} -> {}", merged.root);
                println!("{}", serde_json::to_string_pretty(&merged.resource)?);
            }
        }
    }

    Ok(())
}
