// UI layer: walks the user through the setup steps with `dialoguer`
// prompts, then uploads the chosen directory with an `indicatif` bar.
// Every step is synchronous; gcloud runs attached to the terminal when it
// needs the user (browser login).

use std::path::Path;

use anyhow::{bail, Context, Result};
use dialoguer::{Confirm, Input};
use tracing::warn;

use crate::api::DriveClient;
use crate::config::{settings_path, Settings};
use crate::error::RemoteError;
use crate::gcloud::{self, Gcloud, GcloudCredentials, LOGIN_SCOPES};
use crate::progress::{count_entries, new_bar, ProgressStore};
use crate::store::ContainerId;
use crate::upload::upload_tree;

const DRIVE_API_CONSOLE: &str =
    "https://console.developers.google.com/apis/api/drive.googleapis.com/overview";

/// Run the whole guided flow: check gcloud, log in, set the quota project,
/// enable the Drive API, verify access and upload.
pub fn run(mut settings: Settings) -> Result<()> {
    let gcloud = Gcloud::new();

    print_header();
    verify_gcloud_installed(&gcloud)?;

    println!(
        "\nThis app will guide you to set up Google Application Default Credentials (ADC) \
         with the required scopes, set your quota project, enable the Google Drive API, \
         and upload a folder recursively to Google Drive."
    );
    println!("Some steps are automatic, others need you to act in the browser.");
    pause("Press Enter to continue...")?;

    let folder_id = resolve_folder_id(&mut settings)?;

    loop {
        authenticate_adc(&gcloud)?;
        if test_credentials(&gcloud, &folder_id, settings.project_id.as_deref()) {
            break;
        }
        println!(
            "\nAuthentication failed. Please make sure you logged into the correct Google \
             account and granted the requested scopes."
        );
        let retry = Confirm::new()
            .with_prompt("Try authentication again?")
            .default(true)
            .interact()?;
        if !retry {
            bail!("authentication was not completed");
        }
    }

    settings.project_id = set_quota_project(&gcloud, settings.project_id.as_deref())?;
    enable_drive_api(settings.project_id.as_deref())?;

    if !test_credentials(&gcloud, &folder_id, settings.project_id.as_deref()) {
        bail!(
            "Drive API access test failed after enabling the API. Check your Google Cloud \
             Console permissions and API status, then run the app again."
        );
    }

    println!("\nSTEP 5: Starting folder upload...");
    upload_and_remember(&settings, &settings_path(), || {
        upload_folder(&gcloud, &settings, &folder_id)
    })?;

    println!(
        "\nAll done! Running the app again uploads a second, separate copy of this folder.\n"
    );
    Ok(())
}

/// Run `upload`, then remember the settings at `path` for the next run.
/// The file is written whatever the upload's outcome.
fn upload_and_remember(settings: &Settings, path: &Path, upload: impl FnOnce() -> Result<()>) -> Result<()> {
    let result = upload();
    if let Err(e) = settings.remember_at(path) {
        warn!(error = %e, path = %path.display(), "could not remember settings");
    }
    result
}

fn print_header() {
    println!("\n=== Google Drive Upload Helper ===\n");
}

fn pause(prompt: &str) -> Result<()> {
    Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    Ok(())
}

fn announce(gcloud: &Gcloud, args: &[&str]) {
    println!("\nRunning command:\n  {}", gcloud.command_line(args));
}

fn verify_gcloud_installed(gcloud: &Gcloud) -> Result<()> {
    println!("Checking if 'gcloud' CLI is installed...");
    announce(gcloud, &["--version"]);
    match gcloud.version() {
        Ok(version) => {
            println!("{}", version.trim_end());
            Ok(())
        }
        Err(e) => bail!("'gcloud' is not usable ({e}). Please install the Google Cloud SDK first."),
    }
}

/// The destination folder comes from the settings or is asked for. Both a
/// bare id and a folder URL are accepted.
fn resolve_folder_id(settings: &mut Settings) -> Result<ContainerId> {
    if let Some(id) = settings.folder_id.as_deref().and_then(parse_folder_id) {
        println!("\nDestination Google Drive folder ID: {id}");
        settings.folder_id = Some(id.clone());
        return Ok(ContainerId::new(id));
    }

    let input: String = Input::new()
        .with_prompt("Google Drive folder ID or URL to upload into")
        .validate_with(|s: &String| -> Result<(), &'static str> {
            parse_folder_id(s).map(|_| ()).ok_or("Please enter a folder ID or folder URL")
        })
        .interact_text()?;
    let id = parse_folder_id(&input).context("Invalid folder ID")?;
    settings.folder_id = Some(id.clone());
    Ok(ContainerId::new(id))
}

/// Extract a folder id from `input`, which may be the id itself or a
/// `https://drive.google.com/drive/folders/<id>` link.
pub fn parse_folder_id(input: &str) -> Option<String> {
    let input = input.trim();
    let id = match input.split_once("/folders/") {
        Some((_, rest)) => rest.split(|c: char| matches!(c, '?' | '/' | '#')).next().unwrap_or_default(),
        None => input,
    };
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| id.to_string())
}

fn authenticate_adc(gcloud: &Gcloud) -> Result<()> {
    println!("\nSTEP 1: Authenticate Application Default Credentials (ADC)");
    println!("This will open a browser to log in and authorize.");
    pause("Press Enter to continue...")?;

    let scopes = format!("--scopes={}", LOGIN_SCOPES.join(","));
    announce(gcloud, &["auth", "application-default", "login", &scopes]);
    // A failed login shows up in the credential test that follows.
    if let Err(e) = gcloud.application_default_login(LOGIN_SCOPES) {
        println!("Command failed: {e}");
    }
    Ok(())
}

fn set_quota_project(gcloud: &Gcloud, current: Option<&str>) -> Result<Option<String>> {
    println!("\nSTEP 2: Set your Google Cloud quota project for ADC (needed for Drive uploads)");
    println!("You need to create or have a Google Cloud Project ID to proceed.");

    let project: String = Input::new()
        .with_prompt("Enter your Google Cloud Project ID (leave empty to skip and set it later)")
        .with_initial_text(current.unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;
    let project = project.trim();
    if project.is_empty() {
        println!("Skipping the quota project. You may see quota warnings or errors later.");
        return Ok(None);
    }

    announce(gcloud, &["auth", "application-default", "set-quota-project", project]);
    match gcloud.set_quota_project(project) {
        Ok(()) => println!("Quota project set to: {project}"),
        Err(e) => println!("Command failed: {e}"),
    }
    Ok(Some(project.to_string()))
}

fn enable_drive_api(project: Option<&str>) -> Result<()> {
    let Some(project) = project else {
        println!("\nNo quota project ID given, cannot enable the Drive API automatically.");
        println!("Please enable the Drive API manually here:");
        println!("{DRIVE_API_CONSOLE}?project=YOUR_PROJECT_ID");
        println!("Replace YOUR_PROJECT_ID with your actual project ID.");
        return pause("Press Enter after you have enabled the Drive API...");
    };

    println!("\nSTEP 3: Enabling the Google Drive API in your project on Google Cloud Console");
    let url = format!("{DRIVE_API_CONSOLE}?project={project}");
    println!("Opening this page in your browser to enable the Google Drive API:\n  {url}");
    if let Err(e) = gcloud::open_browser(&url) {
        println!("Could not open a browser ({e}); please open the link above yourself.");
    }
    pause("After enabling the API, press Enter to continue. This may take a few minutes.")
}

/// List one entry of the destination folder to prove that the credentials
/// work. Returns false on any failure after explaining it.
fn test_credentials(gcloud: &Gcloud, folder: &ContainerId, project: Option<&str>) -> bool {
    println!("\nSTEP 4: Testing Application Default Credentials with the Google Drive API");

    let tokens = Box::new(GcloudCredentials::new(gcloud.clone()));
    let client = match DriveClient::from_env(tokens) {
        Ok(client) => client.with_quota_project(project.map(str::to_string)),
        Err(e) => {
            println!("Failed to initialize the Drive client: {e}");
            return false;
        }
    };

    match client.list_children(folder, 1) {
        Ok(files) => {
            println!("Drive API test successful.");
            match files.first() {
                None => println!("No files found (folder may be empty), but API access is working."),
                Some(file) => println!("Sample file: {} (ID: {})", file.name, file.id),
            }
            true
        }
        Err(RemoteError::Auth(e)) => {
            println!("Error: Application Default Credentials not found or invalid ({e}).");
            false
        }
        Err(e) => {
            println!("Drive API test failed with error: {e}");
            false
        }
    }
}

fn upload_folder(gcloud: &Gcloud, settings: &Settings, folder: &ContainerId) -> Result<()> {
    let root = &settings.upload_root;
    println!(
        "\nUploading all files/folders under: {} to Google Drive folder ID: {folder}",
        root.display()
    );
    println!("Existing content is not checked: every run creates a new copy of the whole tree.");
    let proceed = Confirm::new()
        .with_prompt("Start the upload?")
        .default(true)
        .interact()?;
    if !proceed {
        println!("Upload skipped.");
        return Ok(());
    }

    let tokens = Box::new(GcloudCredentials::new(gcloud.clone()));
    let client = DriveClient::from_env(tokens)
        .context("Failed to initialize the Drive client")?
        .with_quota_project(settings.project_id.clone());

    let store = ProgressStore::new(&client, new_bar(Some(count_entries(root))));
    match upload_tree(root, folder, &store) {
        Ok(summary) => {
            store.progress_bar().finish_and_clear();
            println!(
                "\nUpload completed successfully! {} folders created, {} files ({} bytes) uploaded.",
                summary.folders_created, summary.files_uploaded, summary.bytes_uploaded
            );
            Ok(())
        }
        Err(e) => {
            store.progress_bar().abandon();
            Err(anyhow::Error::new(e)
                .context("Upload stopped; the destination folder may hold a partial copy"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::Remembered;

    fn settings() -> Settings {
        Settings {
            folder_id: Some("folder-1".to_string()),
            project_id: Some("project-1".to_string()),
            upload_root: PathBuf::from("/data"),
        }
    }

    #[test]
    fn settings_are_remembered_after_the_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");

        upload_and_remember(&settings(), &path, || {
            assert!(!path.exists(), "settings saved before the upload ran");
            Ok(())
        })
        .unwrap();

        let remembered = Remembered::load(&path).unwrap();
        assert_eq!(remembered.folder_id.as_deref(), Some("folder-1"));
        assert_eq!(remembered.project_id.as_deref(), Some("project-1"));
    }

    #[test]
    fn failed_upload_still_remembers_and_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");

        let err = upload_and_remember(&settings(), &path, || bail!("network down")).unwrap_err();

        assert_eq!(err.to_string(), "network down");
        assert!(path.exists());
    }

    #[test]
    fn accepts_bare_folder_ids() {
        assert_eq!(
            parse_folder_id(" 1AbC-d_Ef "),
            Some("1AbC-d_Ef".to_string())
        );
    }

    #[test]
    fn extracts_id_from_folder_url() {
        assert_eq!(
            parse_folder_id("https://drive.google.com/drive/folders/1AbCdEf?usp=sharing"),
            Some("1AbCdEf".to_string())
        );
        assert_eq!(
            parse_folder_id("https://drive.google.com/drive/u/0/folders/XyZ/"),
            Some("XyZ".to_string())
        );
    }

    #[test]
    fn rejects_empty_or_garbage() {
        assert_eq!(parse_folder_id(""), None);
        assert_eq!(parse_folder_id("   "), None);
        assert_eq!(parse_folder_id("not a folder"), None);
        assert_eq!(parse_folder_id("https://drive.google.com/drive/folders/"), None);
    }
}
