use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInputs {
    pub home_dir: PathBuf,
    pub xdg_config_home: Option<PathBuf>,
    pub chorus_dir_override: Option<PathBuf>,
    pub socket_path_override: Option<PathBuf>,
}

/// Filesystem layout shared by the client and the daemon it talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChorusPaths {
    pub base_dir: PathBuf,
    pub socket_path: PathBuf,
    pub log_path: PathBuf,
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
}

pub fn compute_paths(inputs: PathInputs) -> ChorusPaths {
    let base_dir = inputs
        .chorus_dir_override
        .clone()
        .unwrap_or_else(|| inputs.home_dir.join(".chorus"));

    let config_dir = match inputs.chorus_dir_override {
        Some(ref dir) => dir.join("config"),
        None => inputs
            .xdg_config_home
            .unwrap_or_else(|| inputs.home_dir.join(".config"))
            .join("chorus"),
    };

    // The daemon listens under the base dir unless told otherwise.
    let socket_path = inputs
        .socket_path_override
        .unwrap_or_else(|| base_dir.join("chorus.sock"));

    ChorusPaths {
        socket_path,
        log_path: base_dir.join("chorus.log"),
        config_file: config_dir.join("config.toml"),
        config_dir,
        base_dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> PathInputs {
        PathInputs {
            home_dir: PathBuf::from("/home/ops"),
            xdg_config_home: None,
            chorus_dir_override: None,
            socket_path_override: None,
        }
    }

    #[test]
    fn defaults_live_under_home() {
        let got = compute_paths(inputs());
        assert_eq!(got.base_dir, PathBuf::from("/home/ops/.chorus"));
        assert_eq!(got.socket_path, PathBuf::from("/home/ops/.chorus/chorus.sock"));
        assert_eq!(got.log_path, PathBuf::from("/home/ops/.chorus/chorus.log"));
        assert_eq!(
            got.config_file,
            PathBuf::from("/home/ops/.config/chorus/config.toml")
        );
    }

    #[test]
    fn xdg_config_home_moves_config_only() {
        let got = compute_paths(PathInputs {
            xdg_config_home: Some(PathBuf::from("/tmp/xdg")),
            ..inputs()
        });
        assert_eq!(got.config_dir, PathBuf::from("/tmp/xdg/chorus"));
        assert_eq!(got.base_dir, PathBuf::from("/home/ops/.chorus"));
    }

    #[test]
    fn dir_override_wins_over_xdg() {
        let got = compute_paths(PathInputs {
            xdg_config_home: Some(PathBuf::from("/tmp/xdg")),
            chorus_dir_override: Some(PathBuf::from("/tmp/chorus-dev")),
            ..inputs()
        });
        assert_eq!(got.config_dir, PathBuf::from("/tmp/chorus-dev/config"));
        assert_eq!(got.socket_path, PathBuf::from("/tmp/chorus-dev/chorus.sock"));
    }

    #[test]
    fn socket_override_is_used_verbatim() {
        let got = compute_paths(PathInputs {
            socket_path_override: Some(PathBuf::from("/run/chorus.sock")),
            ..inputs()
        });
        assert_eq!(got.socket_path, PathBuf::from("/run/chorus.sock"));
        assert_eq!(got.log_path, PathBuf::from("/home/ops/.chorus/chorus.log"));
    }
}
