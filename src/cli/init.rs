use clap::{Args, ValueEnum};
use dialoguer::{Confirm, Input, MultiSelect};
use rust_embed::RustEmbed;
use std::fs;
use std::path::{Path, PathBuf};
use tera::Context;
use tokio::process::Command;
use tracing::debug;

use crate::cli::run_cli_async;
use crate::common::{run_with_spinner, run_with_spinner_async};

#[derive(RustEmbed)]
#[folder = "templates/base"]
struct Templates;

/// Manifest of template paths to skip, itself rendered with the project
/// context so presets can exclude whole directories.
const IGNORE_MANIFEST: &str = "_vackignore.tera";
const TEMPLATE_SUFFIX: &str = ".tera";

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum Preset {
    Mock,
    I18n,
    Eslint,
    LintStaged,
    LintCommit,
}

impl Preset {
    const ALL: [Preset; 5] = [
        Preset::Mock,
        Preset::I18n,
        Preset::Eslint,
        Preset::LintStaged,
        Preset::LintCommit,
    ];

    fn label(self) -> &'static str {
        match self {
            Preset::Mock => "mock",
            Preset::I18n => "i18n",
            Preset::Eslint => "eslint",
            Preset::LintStaged => "lint-staged",
            Preset::LintCommit => "lint-commit",
        }
    }

    /// Presets this preset cannot work without.
    fn depends_on(self) -> &'static [Preset] {
        match self {
            Preset::LintStaged => &[Preset::Eslint],
            _ => &[],
        }
    }
}

/// Resolved preset selection with the dependency rule applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresetSet {
    pub mock: bool,
    pub i18n: bool,
    pub eslint: bool,
    pub lint_staged: bool,
    pub lint_commit: bool,
}

impl PresetSet {
    /// Build the set, dropping any preset whose dependency is missing.
    pub fn from_presets(presets: &[Preset]) -> Self {
        let mut set = PresetSet::default();
        for preset in presets {
            set.set(*preset, true);
        }
        loop {
            let mut changed = false;
            for preset in Preset::ALL {
                if set.get(preset) && preset.depends_on().iter().any(|dep| !set.get(*dep)) {
                    set.set(preset, false);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        set
    }

    fn get(self, preset: Preset) -> bool {
        match preset {
            Preset::Mock => self.mock,
            Preset::I18n => self.i18n,
            Preset::Eslint => self.eslint,
            Preset::LintStaged => self.lint_staged,
            Preset::LintCommit => self.lint_commit,
        }
    }

    fn set(&mut self, preset: Preset, value: bool) {
        match preset {
            Preset::Mock => self.mock = value,
            Preset::I18n => self.i18n = value,
            Preset::Eslint => self.eslint = value,
            Preset::LintStaged => self.lint_staged = value,
            Preset::LintCommit => self.lint_commit = value,
        }
    }

    fn wants_git(self) -> bool {
        self.lint_staged || self.lint_commit
    }
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(
        value_name = "TARGET_DIR",
        help = "Where to create the project. Defaults to ./<project-name>"
    )]
    pub target_dir: Option<PathBuf>,
    #[arg(
        long = "name",
        short = 'n',
        help = "The project name. Will prompt if not provided"
    )]
    pub project_name: Option<String>,
    #[arg(long, help = "The npm package name. Defaults to the project name")]
    pub package_name: Option<String>,
    #[arg(
        long = "preset",
        short = 'p',
        value_enum,
        value_delimiter = ',',
        help = "Presets to enable (comma separated). Will prompt if none provided"
    )]
    pub presets: Vec<Preset>,
    #[arg(long, help = "Overwrite a non-empty target directory without asking")]
    pub overwrite: bool,
    #[arg(long, help = "Skip git initialization")]
    pub no_git: bool,
    #[arg(long, short = 'y', help = "Accept defaults for every prompt")]
    pub yes: bool,
}

pub async fn run(args: InitArgs) -> i32 {
    run_cli_async(|| run_inner(args)).await
}

async fn run_inner(mut args: InitArgs) -> Result<(), String> {
    println!("Welcome to vack ⚡\n");

    if args.project_name.is_none() {
        if args.yes {
            args.project_name = Some("vack-project".to_string());
        } else {
            let name = Input::<String>::new()
                .with_prompt("What's the name of your project?")
                .default("vack-project".to_string())
                .interact_text()
                .map_err(|err| format!("Failed to read project name: {err}"))?;
            args.project_name = Some(name);
        }
    }
    let project_name = normalize_project_name(&args.project_name.take().unwrap_or_default())?;

    let package_name = match args.package_name.take() {
        Some(name) => {
            validate_package_name(&name)?;
            name
        }
        None if args.yes => project_name.clone(),
        None => {
            let name = Input::<String>::new()
                .with_prompt("Package name")
                .default(project_name.clone())
                .validate_with(|input: &String| validate_package_name(input))
                .interact_text()
                .map_err(|err| format!("Failed to read package name: {err}"))?;
            name
        }
    };

    let presets = if !args.presets.is_empty() {
        PresetSet::from_presets(&args.presets)
    } else if args.yes {
        PresetSet::from_presets(&[Preset::Mock])
    } else {
        prompt_presets()?
    };
    debug!(?presets, "Resolved presets.");

    let target_dir = args
        .target_dir
        .take()
        .unwrap_or_else(|| PathBuf::from(&project_name));

    if target_dir.exists() && !is_dir_empty(&target_dir)? && !args.overwrite {
        if args.yes {
            return Err(format!(
                "Target directory {} is not empty. Pass --overwrite to proceed.",
                target_dir.display()
            ));
        }
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Target directory {} is not empty. Continue and overwrite?",
                target_dir.display()
            ))
            .default(false)
            .interact()
            .map_err(|err| format!("Failed to read overwrite choice: {err}"))?;
        if !proceed {
            return Err("Aborted.".to_string());
        }
    }

    println!(
        "\nInitializing project {} in {}\n",
        project_name,
        target_dir.display()
    );

    run_with_spinner(
        "📁 Generating project files...",
        "✅ Project files generated",
        || generate_project(&target_dir, &project_name, &package_name, presets),
    )?;

    if presets.wants_git() && !args.no_git {
        init_git(&target_dir).await;
    }

    println!();
    println!("✨ Project {project_name} initialized successfully!");
    if presets.mock {
        println!(
            "🚀 Run `cd {} && vack mock serve` to start the mock server!",
            target_dir.display()
        );
    } else {
        println!("🚀 Run `cd {}` to get started!", target_dir.display());
    }
    Ok(())
}

fn prompt_presets() -> Result<PresetSet, String> {
    let labels: Vec<&str> = Preset::ALL.iter().map(|preset| preset.label()).collect();
    let defaults = [true, false, false, false, false];
    let selection = MultiSelect::new()
        .with_prompt("Which presets would you like to enable? (space to toggle)")
        .items(&labels)
        .defaults(&defaults)
        .interact()
        .map_err(|err| format!("Failed to select presets: {err}"))?;

    let chosen: Vec<Preset> = selection.iter().map(|&idx| Preset::ALL[idx]).collect();
    Ok(PresetSet::from_presets(&chosen))
}

/// Render the embedded template tree into the target directory.
pub fn generate_project(
    target_dir: &Path,
    project_name: &str,
    package_name: &str,
    presets: PresetSet,
) -> Result<(), String> {
    let mut context = Context::new();
    context.insert("project_name", project_name);
    context.insert("package_name", package_name);
    context.insert("mock", &presets.mock);
    context.insert("i18n", &presets.i18n);
    context.insert("eslint", &presets.eslint);
    context.insert("lint_staged", &presets.lint_staged);
    context.insert("lint_commit", &presets.lint_commit);

    let ignored = load_ignore_manifest(&context)?;

    for file in Templates::iter() {
        let rel = file.as_ref();
        if rel == IGNORE_MANIFEST || is_ignored(rel, &ignored) {
            continue;
        }
        let Some(embedded) = Templates::get(rel) else {
            continue;
        };

        let is_template = rel.ends_with(TEMPLATE_SUFFIX);
        let out_rel = output_path(rel);
        let target_path = target_dir.join(&out_rel);
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create directory: {err}"))?;
        }

        if is_template {
            let content = std::str::from_utf8(&embedded.data)
                .map_err(|err| format!("Template {rel} is not valid UTF-8: {err}"))?;
            let rendered = tera::Tera::one_off(content, &context, false)
                .map_err(|err| format!("Failed to render template {rel}: {err}"))?;
            fs::write(&target_path, rendered)
                .map_err(|err| format!("Failed to write {}: {err}", target_path.display()))?;
        } else {
            fs::write(&target_path, embedded.data.as_ref())
                .map_err(|err| format!("Failed to write {}: {err}", target_path.display()))?;
        }
    }
    Ok(())
}

/// Template paths use a `_` prefix for dotfiles so they survive packaging;
/// the rendered output restores the dot and drops the template suffix.
fn output_path(rel: &str) -> String {
    let trimmed = rel.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(rel);
    let (dir, file) = match trimmed.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, trimmed),
    };
    let file = match file.strip_prefix('_') {
        Some(rest) => format!(".{rest}"),
        None => file.to_string(),
    };
    match dir {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    }
}

fn load_ignore_manifest(context: &Context) -> Result<Vec<String>, String> {
    let Some(embedded) = Templates::get(IGNORE_MANIFEST) else {
        return Ok(Vec::new());
    };
    let content = std::str::from_utf8(&embedded.data)
        .map_err(|err| format!("Ignore manifest is not valid UTF-8: {err}"))?;
    let rendered = tera::Tera::one_off(content, context, false)
        .map_err(|err| format!("Failed to render ignore manifest: {err}"))?;
    Ok(rendered
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// A manifest entry ending in `/` excludes a whole directory, otherwise it
/// must match the template path exactly.
fn is_ignored(rel: &str, ignored: &[String]) -> bool {
    ignored.iter().any(|entry| {
        if let Some(prefix) = entry.strip_suffix('/') {
            rel == prefix || rel.starts_with(&format!("{prefix}/"))
        } else {
            rel == entry
        }
    })
}

fn normalize_project_name(project_name: &str) -> Result<String, String> {
    let normalized = project_name.trim().to_lowercase().replace([' ', '_'], "-");
    if normalized.is_empty() {
        return Err("Project name must not be empty.".to_string());
    }
    if !normalized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(
            "Invalid project name. Please use only alphanumeric characters and dashes."
                .to_string(),
        );
    }
    Ok(normalized)
}

/// npm package name rules, minus the legacy grandfathered cases.
fn validate_package_name(package_name: &str) -> Result<(), String> {
    let name = match package_name.strip_prefix('@') {
        Some(scoped) => {
            let Some((scope, rest)) = scoped.split_once('/') else {
                return Err("Scoped package name must look like @scope/name.".to_string());
            };
            if scope.is_empty() {
                return Err("Package scope must not be empty.".to_string());
            }
            if !scope
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_.".contains(c))
            {
                return Err(format!("Invalid package scope: @{scope}"));
            }
            rest
        }
        None => package_name,
    };
    if name.is_empty() || name.len() > 214 {
        return Err("Package name must be 1-214 characters.".to_string());
    }
    if name.starts_with('.') || name.starts_with('_') {
        return Err("Package name must not start with '.' or '_'.".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_.".contains(c))
    {
        return Err(format!("Invalid package name: {package_name}"));
    }
    Ok(())
}

fn is_dir_empty(path: &Path) -> Result<bool, String> {
    let mut entries = fs::read_dir(path)
        .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
    Ok(entries.next().is_none())
}

async fn init_git(target_dir: &Path) {
    if !is_command_available("git").await {
        println!("⚠️  Git is not available - skipping git initialization");
        return;
    }
    match is_in_git_repo(target_dir).await {
        Ok(true) => {
            println!("✓ Already in a git repository - skipping git initialization");
            return;
        }
        Ok(false) => {}
        Err(err) => {
            println!("⚠️  Failed to check git repository: {err}");
            return;
        }
    }

    let target = target_dir.to_path_buf();
    let git_result = run_with_spinner_async(
        "🔧 Initializing git repository...",
        "✅ Git repository initialized",
        move || async move {
            let mut init_cmd = Command::new("git");
            init_cmd.arg("init").current_dir(&target);
            run_command(&mut init_cmd, "Failed to initialize git repository").await?;

            let mut add_cmd = Command::new("git");
            add_cmd.arg("add").arg(".").current_dir(&target);
            run_command(&mut add_cmd, "Failed to add files to git repository").await?;

            let mut commit_cmd = Command::new("git");
            commit_cmd
                .arg("commit")
                .arg("-m")
                .arg("init")
                .current_dir(&target);
            run_command(&mut commit_cmd, "Failed to commit files to git repository").await?;
            Ok(())
        },
    )
    .await;

    if let Err(err) = git_result {
        println!("⚠️  Git initialization failed: {err}");
        println!("   Continuing with project setup...");
    }
}

async fn is_in_git_repo(path: &Path) -> Result<bool, String> {
    let output = Command::new("git")
        .arg("rev-parse")
        .arg("--is-inside-work-tree")
        .current_dir(path)
        .output()
        .await
        .map_err(|err| format!("Failed to check git repository: {err}"))?;
    let is_inside =
        output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true";
    if is_inside {
        return Ok(true);
    }
    Ok(has_git_dir(path))
}

fn has_git_dir(path: &Path) -> bool {
    for ancestor in path.ancestors() {
        let candidate = ancestor.join(".git");
        if candidate.is_dir() {
            return true;
        }
    }
    false
}

async fn run_command(cmd: &mut Command, error_msg: &str) -> Result<(), String> {
    let output = cmd
        .output()
        .await
        .map_err(|err| format!("{error_msg}: {err}"))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut message = format!("❌ {error_msg}");
    if !stderr.trim().is_empty() {
        message.push_str(&format!("\n{stderr}"));
    }
    if !stdout.trim().is_empty() {
        message.push_str(&format!("\n{stdout}"));
    }
    Err(message)
}

async fn is_command_available(cmd: &str) -> bool {
    Command::new(cmd)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
