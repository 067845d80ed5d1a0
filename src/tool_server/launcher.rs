use std::collections::BTreeMap;

use crate::config::ToolServerConfig;
use crate::models::Credentials;

const PACKAGE_RUNNER: &str = "npx";
const PACKAGE_RUNNER_WINDOWS: &str = "npx.cmd";

/// Host family as far as launching the package runner is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Platform::Windows,
            _ => Platform::Other,
        }
    }

    /// Windows only resolves the runner through its `.cmd` shim.
    pub fn runner_executable(self) -> &'static str {
        match self {
            Platform::Windows => PACKAGE_RUNNER_WINDOWS,
            Platform::Other => PACKAGE_RUNNER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable: String,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

/// Launch spec for the current host and process environment.
pub fn build_launch_spec(credentials: &Credentials, config: &ToolServerConfig) -> LaunchSpec {
    let inherited = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    build_launch_spec_for(credentials, config, Platform::current(), inherited)
}

pub fn build_launch_spec_for<I>(
    credentials: &Credentials,
    config: &ToolServerConfig,
    platform: Platform,
    inherited: I,
) -> LaunchSpec
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut environment: BTreeMap<String, String> = inherited.into_iter().collect();
    environment.insert(
        config.token_env.clone(),
        credentials.source_control_token.clone(),
    );
    environment.insert(config.toolsets_env.clone(), config.toolsets.clone());

    LaunchSpec {
        executable: platform.runner_executable().to_string(),
        arguments: vec![config.package.clone()],
        environment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("sk-test", "ghp_secret")
    }

    #[test]
    fn test_executable_is_pure_function_of_platform() {
        let config = ToolServerConfig::default();
        let win = build_launch_spec_for(&creds(), &config, Platform::Windows, Vec::new());
        let other = build_launch_spec_for(&creds(), &config, Platform::Other, Vec::new());
        assert_eq!(win.executable, "npx.cmd");
        assert_eq!(other.executable, "npx");
    }

    #[test]
    fn test_platform_from_os() {
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("linux"), Platform::Other);
        assert_eq!(Platform::from_os("macos"), Platform::Other);
        assert_eq!(Platform::from_os("freebsd"), Platform::Other);
    }

    #[test]
    fn test_single_package_argument() {
        let spec = build_launch_spec_for(
            &creds(),
            &ToolServerConfig::default(),
            Platform::Other,
            Vec::new(),
        );
        assert_eq!(spec.arguments, vec!["@modelcontextprotocol/server-github"]);
    }

    #[test]
    fn test_environment_extends_inherited() {
        let inherited = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("HOME".to_string(), "/home/octo".to_string()),
        ];
        let spec = build_launch_spec_for(
            &creds(),
            &ToolServerConfig::default(),
            Platform::Other,
            inherited.clone(),
        );

        for (k, v) in &inherited {
            assert_eq!(spec.environment.get(k), Some(v));
        }
        assert_eq!(
            spec.environment.get("GITHUB_PERSONAL_ACCESS_TOKEN").map(String::as_str),
            Some("ghp_secret")
        );
        assert_eq!(
            spec.environment.get("GITHUB_TOOLSETS").map(String::as_str),
            Some("repos,issues,pull_requests")
        );
        assert_eq!(spec.environment.len(), inherited.len() + 2);
    }

    #[test]
    fn test_overlay_wins_over_inherited_value() {
        let inherited = vec![(
            "GITHUB_PERSONAL_ACCESS_TOKEN".to_string(),
            "stale".to_string(),
        )];
        let spec = build_launch_spec_for(
            &creds(),
            &ToolServerConfig::default(),
            Platform::Other,
            inherited,
        );
        assert_eq!(spec.environment["GITHUB_PERSONAL_ACCESS_TOKEN"], "ghp_secret");
    }

    #[test]
    fn test_process_environment_untouched() {
        let before: Vec<_> = std::env::vars_os().collect();
        let spec = build_launch_spec(&creds(), &ToolServerConfig::default());
        let after: Vec<_> = std::env::vars_os().collect();

        assert_eq!(before, after);
        assert_eq!(spec.executable, Platform::current().runner_executable());
        for (k, v) in std::env::vars_os() {
            if let (Some(k), Some(v)) = (k.to_str(), v.to_str()) {
                if k == "GITHUB_PERSONAL_ACCESS_TOKEN" || k == "GITHUB_TOOLSETS" {
                    continue;
                }
                assert_eq!(spec.environment.get(k).map(String::as_str), Some(v));
            }
        }
    }
}
