//! Cloud-init custom data that turns a fresh VM into a target host.

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Where the agent writes its own log on the machine.
pub const AGENT_LOG_FILE_PATH: &str = "/home/daytona/.daytona-agent.log";

const PREAMBLE: &str = r#"#!/bin/bash
useradd -m -d /home/daytona daytona

curl -fsSL https://get.docker.com | bash

# Modify Docker daemon configuration
cat > /etc/docker/daemon.json <<EOF
{
  "hosts": ["unix:///var/run/docker.sock", "tcp://0.0.0.0:2375"]
}
EOF

# Create a systemd drop-in file to modify the Docker service
mkdir -p /etc/systemd/system/docker.service.d
cat > /etc/systemd/system/docker.service.d/override.conf <<EOF
[Service]
ExecStart=
ExecStart=/usr/bin/dockerd
EOF

systemctl daemon-reload
systemctl restart docker
systemctl start docker

usermod -aG docker daytona

if grep -q sudo /etc/group; then
	usermod -aG sudo,docker daytona
elif grep -q wheel /etc/group; then
	usermod -aG wheel,docker daytona
fi

echo "daytona ALL=(ALL) NOPASSWD:ALL" > /etc/sudoers.d/91-daytona

"#;

const UNIT_HEADER: &str = r#"
echo '[Unit]
Description=Daytona Agent Service
After=network.target

[Service]
User=daytona
ExecStart=/usr/local/bin/daytona agent --target
Restart=always
"#;

const UNIT_FOOTER: &str = r#"
[Install]
WantedBy=multi-user.target' > /etc/systemd/system/daytona-agent.service
systemctl daemon-reload
systemctl enable daytona-agent.service
systemctl start daytona-agent.service
"#;

/// Command that downloads and runs the agent installer.
pub fn init_script(api_key: &str, download_url: &str) -> String {
    format!("curl -sfL -H \"Authorization: Bearer {api_key}\" {download_url} | bash")
}

/// Full bootstrap script. Variables are emitted in key order.
pub fn bootstrap_script(env_vars: &HashMap<String, String>, init_script: &str) -> String {
    let mut env: BTreeMap<&str, &str> = env_vars
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    env.insert("DAYTONA_AGENT_LOG_FILE_PATH", AGENT_LOG_FILE_PATH);

    let mut script = String::from(PREAMBLE);
    for (key, value) in &env {
        script.push_str(&format!("export {key}={value}\n"));
    }
    script.push_str(init_script);
    script.push_str(UNIT_HEADER);
    for (key, value) in &env {
        script.push_str(&format!("Environment='{key}={value}'\n"));
    }
    script.push_str(UNIT_FOOTER);
    script
}

pub fn encode_custom_data(script: &str) -> String {
    STANDARD.encode(script.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> HashMap<String, String> {
        HashMap::from([
            ("ZETA".to_string(), "last".to_string()),
            ("ALPHA".to_string(), "first".to_string()),
        ])
    }

    #[test]
    fn init_script_authenticates_download() {
        assert_eq!(
            init_script("key-1", "https://srv/download"),
            "curl -sfL -H \"Authorization: Bearer key-1\" https://srv/download | bash"
        );
    }

    #[test]
    fn script_sections_are_ordered() {
        let script = bootstrap_script(&env(), "INIT");

        let docker = script.find("get.docker.com").unwrap();
        let sudoers = script.find("91-daytona").unwrap();
        let export = script.find("export ALPHA=first").unwrap();
        let init = script.find("INIT").unwrap();
        let unit = script.find("daytona agent --target").unwrap();
        let environment = script.find("Environment='ALPHA=first'").unwrap();
        let start = script.find("systemctl start daytona-agent.service").unwrap();

        assert!(docker < sudoers && sudoers < export && export < init);
        assert!(init < unit && unit < environment && environment < start);
        assert!(script.contains("tcp://0.0.0.0:2375"));
    }

    #[test]
    fn env_lines_are_sorted_and_include_agent_log_path() {
        let script = bootstrap_script(&env(), "");

        let alpha = script.find("export ALPHA=").unwrap();
        let log = script.find("export DAYTONA_AGENT_LOG_FILE_PATH=/home/daytona/.daytona-agent.log").unwrap();
        let zeta = script.find("export ZETA=").unwrap();
        assert!(alpha < log && log < zeta);

        assert_eq!(script, bootstrap_script(&env(), ""));
    }

    #[test]
    fn custom_data_is_standard_base64() {
        assert_eq!(encode_custom_data("#!/bin/bash\n"), "IyEvYmluL2Jhc2gK");
    }
}
