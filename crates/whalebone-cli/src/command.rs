//! The closed set of cluster commands and their extra argument.

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ClusterCommand {
    /// Run a shell command on every node.
    Run,
    /// Show the token ring as each node sees it.
    Ring,
    /// Print id, public and private name of every instance.
    List,
    /// Run the stress tool against the cluster named in remote_boxen.private.
    Stress,
    ListPublicDns,
    ListPrivateDns,
    /// Replace the cluster with a fresh one and bootstrap it.
    Launch,
    WaitForLaunch,
    Terminate,
    WaitForTerminate,
    /// Start Cassandra on every node.
    Start,
    /// Kill Cassandra on every node.
    Stop,
    /// Delete data, commit logs, caches and logs.
    Cleardata,
    PushConfig,
    /// Ship another cluster's host files to this one (for stress clients).
    PushClientConfig,
    InstallClient,
    DownloadCassandra,
    WaitForSsh,
    FullUpgrade,
    Reboot,
    /// Stripe the ephemeral disks into /dev/md0 and mount it on /mnt.
    BuildRaid,
    Mkdirs,
    /// Mirror a local Cassandra tree onto every node.
    PushLocalCassandra,
    /// Import the schema through the first node.
    ImportSchema,
    /// Append a public key to every node's authorized_keys.
    PushPubKey,
}

impl ClusterCommand {
    /// What the extra argument means, for commands that require one.
    pub fn extra_arg(self) -> Option<&'static str> {
        match self {
            ClusterCommand::PushClientConfig => Some("remote cluster name"),
            ClusterCommand::Stress => Some("stress options"),
            ClusterCommand::Run => Some("shell command"),
            ClusterCommand::PushLocalCassandra => Some("local cassandra directory"),
            ClusterCommand::PushPubKey => Some("public key file"),
            _ => None,
        }
    }

    pub fn name(self) -> String {
        self.to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_else(|| format!("{self:?}"))
    }

    /// Check the extra argument is present exactly when required.
    pub fn check_extra(self, extra: Option<&str>) -> Result<(), String> {
        match (self.extra_arg(), extra) {
            (Some(_), Some(_)) | (None, None) => Ok(()),
            (Some(what), None) => Err(format!("{} requires a {what}", self.name())),
            (None, Some(arg)) => Err(format!(
                "{} takes no extra argument (got {arg:?})",
                self.name()
            )),
        }
    }
}
