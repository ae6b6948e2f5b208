//! Accounts, login and the persisted session file.
//!
//! The session file holds two lines: the user id, then `admin` or `normal`.
//! It is written on login, removed on logout and read at startup. Password
//! hashing happens outside this crate; only hashes are compared here.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{GameError, Result};
use crate::model::{NewAccount, User};
use crate::storage::Storage;

const ADMIN_ROLE: &str = "admin";
const NORMAL_ROLE: &str = "normal";

/// The logged-in user as recorded in the session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: String,
    pub is_admin: bool,
}

impl Session {
    fn render(&self) -> String {
        let role = if self.is_admin { ADMIN_ROLE } else { NORMAL_ROLE };
        format!("{}\n{}\n", self.user_id, role)
    }

    fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines();
        let user_id = lines.next()?.trim();
        if user_id.is_empty() {
            return None;
        }
        let role = lines.next().unwrap_or_default().trim();

        Some(Self {
            user_id: user_id.to_string(),
            is_admin: role.eq_ignore_ascii_case(ADMIN_ROLE),
        })
    }
}

/// Location of the persisted session.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        tokio::fs::write(&self.path, session.render()).await?;
        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    /// The stored session, or `None` when no file exists or it is empty.
    pub async fn load(&self) -> Result<Option<Session>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Session::parse(&contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the session file. A missing file is not an error.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Create a level 1 account with no points.
///
/// Rejected when the id or the display name is already taken.
pub async fn create_account(storage: &Storage, account: &NewAccount) -> Result<User> {
    let id = account.id.trim();
    let name = account.name.trim();
    if id.is_empty() || name.is_empty() || account.password_hash.is_empty() {
        return Err(GameError::InvalidInput(
            "id, name and password are required".to_string(),
        ));
    }

    if storage.user_exists(id, name).await? {
        warn!(user_id = id, "Account already exists");
        return Err(GameError::UserExists(id.to_string()));
    }

    let user = User::new(id, name);
    storage.insert_user(&user, &account.password_hash).await?;

    info!(user_id = %user.id, "Account created");
    Ok(user)
}

/// Check credentials and persist the session.
pub async fn login(
    storage: &Storage,
    session_file: &SessionFile,
    user_id: &str,
    password_hash: &str,
) -> Result<User> {
    let stored = storage.password_hash(user_id).await?;
    if stored.as_deref() != Some(password_hash) {
        warn!(user_id, "Login failed");
        return Err(GameError::InvalidCredentials);
    }

    let user = storage
        .get_user(user_id)
        .await?
        .ok_or_else(|| GameError::UserNotFound(user_id.to_string()))?;

    session_file
        .save(&Session {
            user_id: user.id.clone(),
            is_admin: user.is_admin,
        })
        .await?;

    info!(user_id, admin = user.is_admin, "Logged in");
    Ok(user)
}

pub async fn logout(session_file: &SessionFile) -> Result<()> {
    session_file.clear().await?;
    info!("Logged out");
    Ok(())
}

/// Restore the user named in the session file.
///
/// The admin flag comes from the file, not from the stored user.
pub async fn restore(storage: &Storage, session_file: &SessionFile) -> Result<Option<User>> {
    let Some(session) = session_file.load().await? else {
        debug!(path = %session_file.path().display(), "No session to restore");
        return Ok(None);
    };

    let Some(mut user) = storage.get_user(&session.user_id).await? else {
        warn!(user_id = %session.user_id, "Session refers to an unknown user");
        return Ok(None);
    };
    user.is_admin = session.is_admin;

    Ok(Some(user))
}
