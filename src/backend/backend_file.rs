use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{CreateError, FindError};
use crate::id::UserId;
use crate::session::{Session, SessionId};
use crate::user::User;

/// Documents on disk:
/// - `users/<uid>.json`: the whole user, cards embedded
/// - `sessions/<sid>.json`: the owning user id
/// - `emails/<sha256 of email>`: the user id that claimed the address
pub struct Backend {
    root: PathBuf,
}

type Result<T> = std::result::Result<T, ()>;

#[derive(Serialize, Deserialize)]
struct SessionDoc {
    uid: UserId,
}

macro_rules! path {
    ($root: expr, $($components: expr),*) => {
        {
            let mut p = $root.clone();
            path!(@internal, p, $($components),*);
            p
        }
    };
    (@internal, $p:expr, $next:expr, $($rest: expr),*) => {
        $p.push($next);
        path!(@internal, $p, $($rest),*);
    };
    (@internal, $p:expr, $next:expr) => {
        $p.push($next);
    };
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let root = data_dir.to_path_buf();

        for dir in ["users", "sessions", "emails"] {
            let path = path!(root, dir);
            fs::create_dir_all(&path).map_err(|e| {
                error!("couldn't create {path:?}: {e:?}");
            })?;
        }

        info!("Using {root:?}");
        Ok(Self { root })
    }

    fn user_path(&self, id: &UserId) -> PathBuf {
        path!(self.root, "users", format!("{id}.json"))
    }

    fn session_path(&self, id: &SessionId) -> PathBuf {
        path!(self.root, "sessions", format!("{id}.json"))
    }

    fn email_path(&self, email: &str) -> PathBuf {
        path!(self.root, "emails", sha256::digest(email))
    }
}

impl Backend {
    fn read<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> std::result::Result<T, FindError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                return FindError::NotFound;
            }
            error!("open {path:?}: {e:?}");
            FindError::Internal
        })?;

        serde_json::from_reader(file).map_err(|e| {
            error!("couldn't parse {path:?}: {e:?}");
            FindError::Internal
        })
    }

    /// Replaces the document at `path` in one step, via a rename. Each call
    /// stages its own temp file, so concurrent writers never share one.
    fn write<T: Serialize>(&self, path: &Path, doc: &T) -> Result<()> {
        let tmp = path.with_file_name(format!(".{}.tmp", Uuid::new_v4()));

        let json = serde_json::to_vec(doc).map_err(|e| {
            error!("couldn't convert {path:?} to json: {e:?}");
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .map_err(|e| {
                error!("open {tmp:?}: {e:?}");
            })?;

        let written = file
            .write_all(&json)
            .and_then(|()| file.sync_all())
            .map_err(|e| {
                error!("writing {tmp:?}: {e:?}");
            })
            .and_then(|()| {
                fs::rename(&tmp, path).map_err(|e| {
                    error!("rename {tmp:?} -> {path:?}: {e:?}");
                })
            });

        if written.is_err() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!("couldn't clean up {tmp:?}: {e:?}");
            }
        }
        written
    }
}

impl Backend {
    pub async fn find_user(&self, id: &UserId) -> std::result::Result<User, FindError> {
        self.read(&self.user_path(id))
    }

    pub async fn find_user_by_email(&self, email: &str) -> std::result::Result<User, FindError> {
        let path = self.email_path(email);

        let mut uid = String::new();
        File::open(&path)
            .and_then(|mut file| file.read_to_string(&mut uid))
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    return FindError::NotFound;
                }
                error!("open {path:?}: {e:?}");
                FindError::Internal
            })?;

        if uid.is_empty() {
            // claimed, registration still in flight
            return Err(FindError::NotFound);
        }

        let uid = uid.parse::<UserId>().map_err(|e| {
            error!("invalid user id in {path:?}: {e}");
            FindError::Internal
        })?;

        self.find_user(&uid).await
    }

    /// Claims `user.email` before writing the user, so at most one user
    /// ever owns an address.
    pub async fn create_user(&self, user: &User) -> std::result::Result<(), CreateError> {
        let claim = self.email_path(&user.email);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&claim) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!("email for user {} already taken", user.id);
                return Err(CreateError::EmailTaken);
            }
            Err(e) => {
                error!("claiming {claim:?}: {e:?}");
                return Err(CreateError::Internal);
            }
        };

        let created = file
            .write_all(user.id.to_string().as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| {
                error!("writing {claim:?}: {e:?}");
            })
            .and_then(|()| self.write(&self.user_path(&user.id), user));

        if created.is_err() {
            if let Err(e) = fs::remove_file(&claim) {
                warn!("couldn't release {claim:?}: {e:?}");
            }
            return Err(CreateError::Internal);
        }
        Ok(())
    }

    /// Persists the whole document, cards included.
    pub async fn save_user(&self, user: &User) -> Result<()> {
        self.write(&self.user_path(&user.id), user)
    }
}

impl Backend {
    pub async fn create_session(&self, session: &Session) -> Result<()> {
        let doc = SessionDoc { uid: session.uid };
        self.write(&self.session_path(&session.id), &doc)
    }

    pub async fn find_session(&self, id: &SessionId) -> std::result::Result<Session, FindError> {
        let SessionDoc { uid } = self.read(&self.session_path(id))?;
        Ok(Session { id: *id, uid })
    }

    pub async fn delete_session(&self, id: &SessionId) -> Result<()> {
        match fs::remove_file(self.session_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("session {id} already gone");
                Ok(())
            }
            Err(e) => {
                error!("couldn't remove session {id}: {e:?}");
                Err(())
            }
        }
    }
}
