use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use keyfort_core::{CredentialEntry, CredentialStore, VaultError, VaultState};

mod storage;
use storage::FileStorage;

/// Encrypted credential vault over a local document file.
#[derive(Parser)]
#[command(name = "keyfort")]
#[command(about = "Encrypted credential vault", long_about = None)]
struct Cli {
    /// Path of the vault document file
    #[arg(long, global = true, default_value = "keyfort.json")]
    vault: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault seeded with the starter entries
    Init,

    /// List entry names and metadata
    List,

    /// Show one entry, including its decrypted secret fields
    Show {
        /// Entry name
        name: String,
    },

    /// Add a new credential entry (prompts for the secret)
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        url: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        login: String,
        #[arg(long, default_value = "")]
        keywords: String,
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Remove an entry by name
    Remove {
        /// Entry name
        name: String,
    },

    /// Sort entries by name and save
    Sort,

    /// Re-encrypt the vault under a new master password
    ChangePassword,

    /// Upgrade the vault to the current crypto parameters
    Upgrade,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => init(&cli.vault).await,
        Commands::List => list(&cli.vault).await,
        Commands::Show { name } => show(&cli.vault, &name).await,
        Commands::Add {
            name,
            url,
            email,
            login,
            keywords,
            notes,
        } => add(&cli.vault, name, url, email, login, keywords, notes).await,
        Commands::Remove { name } => remove(&cli.vault, &name).await,
        Commands::Sort => sort(&cli.vault).await,
        Commands::ChangePassword => change_password(&cli.vault).await,
        Commands::Upgrade => upgrade(&cli.vault).await,
    }
}

async fn init(path: &Path) -> Result<()> {
    let mut store = CredentialStore::new(FileStorage::new(path));
    store.download().await.map_err(vault_err)?;
    if store.state() != VaultState::Missing {
        bail!("a vault already exists at {}", path.display());
    }

    let password = rpassword::prompt_password("New master password: ")?;
    let repeat = rpassword::prompt_password("Repeat master password: ")?;
    if password != repeat {
        bail!("passwords do not match");
    }

    store.create(&password).await.map_err(vault_err)?;
    let count = store.model().map_err(vault_err)?.entries.len();
    println!("Vault created at {} with {count} starter entries.", path.display());
    Ok(())
}

async fn list(path: &Path) -> Result<()> {
    let store = open_unlocked(path).await?;
    for entry in &store.model().map_err(vault_err)?.entries {
        let account = if entry.login.is_empty() {
            &entry.email
        } else {
            &entry.login
        };
        println!("{:<24} {:<28} {}", entry.name, account, entry.url);
    }
    Ok(())
}

async fn show(path: &Path, name: &str) -> Result<()> {
    let store = open_unlocked(path).await?;
    let entry = find_entry(&store, name)?;
    let decrypted = store.decrypt_entry(&entry).map_err(vault_err)?;

    println!("Name:     {}", decrypted.name);
    println!("URL:      {}", decrypted.url);
    println!("E-mail:   {}", decrypted.email);
    println!("Login:    {}", decrypted.login);
    println!("Keywords: {}", decrypted.keywords);
    println!("Password: {}", decrypted.password);
    println!("Notes:    {}", decrypted.notes);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn add(
    path: &Path,
    name: String,
    url: String,
    email: String,
    login: String,
    keywords: String,
    notes: String,
) -> Result<()> {
    let mut store = open_unlocked(path).await?;
    let password = rpassword::prompt_password("Entry password: ")?;

    let entry = CredentialEntry {
        name,
        url,
        email,
        login,
        keywords,
        password,
        notes,
        ..CredentialEntry::new()
    };
    let encrypted = store.encrypt_entry(&entry).map_err(vault_err)?;
    store.add_entry(encrypted).map_err(vault_err)?;
    store.upload().await.map_err(vault_err)?;
    println!("Entry {:?} added.", entry.name);
    Ok(())
}

async fn remove(path: &Path, name: &str) -> Result<()> {
    let mut store = open_unlocked(path).await?;
    let entry = find_entry(&store, name)?;
    store.delete_entry(&entry.id).map_err(vault_err)?;
    store.upload().await.map_err(vault_err)?;
    println!("Entry {:?} removed.", entry.name);
    Ok(())
}

async fn sort(path: &Path) -> Result<()> {
    let mut store = open_unlocked(path).await?;
    store.sort_entries().map_err(vault_err)?;
    store.upload().await.map_err(vault_err)?;
    println!("Entries sorted.");
    Ok(())
}

async fn change_password(path: &Path) -> Result<()> {
    let mut store = open_locked(path).await?;

    let old_password = rpassword::prompt_password("Old master password: ")?;
    let new_password = rpassword::prompt_password("New master password: ")?;
    let repeat = rpassword::prompt_password("Repeat new master password: ")?;
    if new_password != repeat {
        bail!("passwords do not match");
    }

    store
        .change_password(&old_password, &new_password)
        .await
        .map_err(vault_err)?;
    store.upload().await.map_err(vault_err)?;
    println!("Master password changed.");
    Ok(())
}

async fn upgrade(path: &Path) -> Result<()> {
    let mut store = open_locked(path).await?;
    if !store.is_upgrade_suggested() {
        println!("Vault already uses the current crypto parameters.");
        return Ok(());
    }

    let password = rpassword::prompt_password("Master password: ")?;
    store.upgrade_crypto_params(&password).await.map_err(vault_err)?;
    store.upload().await.map_err(vault_err)?;
    println!("Vault upgraded to the current crypto parameters.");
    Ok(())
}

/// Downloads the vault and leaves it locked, for operations that rewrite it.
async fn open_locked(path: &Path) -> Result<CredentialStore<FileStorage>> {
    let mut store = CredentialStore::new(FileStorage::new(path));
    store.download().await.map_err(vault_err)?;
    match store.state() {
        VaultState::Locked => Ok(store),
        VaultState::Missing => bail!(
            "no vault at {}; run `keyfort init` first",
            path.display()
        ),
        state => bail!("unexpected vault state {state:?}"),
    }
}

/// Downloads the vault and unlocks it with a prompted master password.
async fn open_unlocked(path: &Path) -> Result<CredentialStore<FileStorage>> {
    let mut store = open_locked(path).await?;
    let password = rpassword::prompt_password("Master password: ")?;
    store.unlock(&password).await.map_err(vault_err)?;
    if store.is_upgrade_suggested() {
        eprintln!("note: this vault uses outdated crypto parameters; run `keyfort upgrade`");
    }
    Ok(store)
}

fn find_entry(store: &CredentialStore<FileStorage>, name: &str) -> Result<CredentialEntry> {
    store
        .model()
        .map_err(vault_err)?
        .entries
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(name))
        .cloned()
        .ok_or_else(|| anyhow!("no entry named {name:?}"))
}

fn vault_err(error: VaultError) -> anyhow::Error {
    anyhow!("{error} ({})", error.code())
}
