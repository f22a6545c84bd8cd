use log::warn;
use nix::errno::Errno;
use nix::unistd::User;

/// Home directory of `user` from the account database.
///
/// Unknown users give `None`; lookup failures other than `EINTR` are
/// logged and also give `None`.
pub fn home_dir_of(user: &str) -> Option<String> {
    loop {
        match User::from_name(user) {
            Ok(Some(entry)) => return Some(entry.dir.to_string_lossy().into_owned()),
            Ok(None) => return None,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!("looking up the home directory of '{user}' failed: {e}");
                return None;
            }
        }
    }
}
