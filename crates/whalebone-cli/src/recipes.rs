//! Remote command recipes.
//!
//! Every string here is opaque to the lifecycle: it is handed to the
//! dispatcher as-is and run by the remote login shell.

use std::path::{Path, PathBuf};

use whalebone_lifecycle::Step;

pub const CASSANDRA_HOME: &str = "/usr/local/apache-cassandra";
pub const CASSANDRA_SRC: &str = "/usr/local/apache-cassandra-src";

/// Blocks until the first-boot script has dropped its marker.
pub const SETUP_COMPLETE_WAIT: &str =
    "while true; do if [ -f /setup_complete ]; then exit 0; fi; sleep 2; done";

pub const STOP: &str =
    "kill -9 `cat /var/run/cassandra/cassandra.pid` && rm /var/run/cassandra/cassandra.pid";
pub const RING: &str = "/usr/local/apache-cassandra/bin/nodetool -h 127.0.0.1 ring";
pub const CLEARDATA: &str = "rm -rf /mnt/cassandra-commitlogs/* /mnt/cassandra-data/* \
     /mnt/cassandra-caches/* /var/log/cassandra/* /mnt/cassandra-gclog/*";
pub const FULL_UPGRADE: &str = "sudo aptitude -y full-upgrade";
pub const REBOOT: &str = "sudo reboot";
pub const IMPORT_SCHEMA: &str = "/usr/local/apache-cassandra/bin/schematool 127.0.0.1 8080 import";
pub const APPEND_AUTHORIZED_KEY: &str = "cat >> .ssh/authorized_keys";

const RAID: &[&str] = &[
    "sudo apt-get install mdadm --no-install-recommends",
    "sudo umount /dev/sdb",
    "sudo dd if=/dev/zero of=/dev/sdb bs=4096 count=1024",
    "sudo dd if=/dev/zero of=/dev/sdc bs=4096 count=1024",
    "sudo dd if=/dev/zero of=/dev/sdd bs=4096 count=1024",
    "sudo dd if=/dev/zero of=/dev/sde bs=4096 count=1024",
    "sudo partprobe",
    "sudo mdadm --create /dev/md0 --level=0 --raid-devices=4 --run /dev/sdb /dev/sdc /dev/sdd /dev/sde",
    "sudo mkfs.ext3 /dev/md0",
    "sudo sed -i -e s/sdb/md0/ /etc/fstab",
    "sudo mount /dev/md0 /mnt",
    "sudo chmod o+w /etc/mdadm/mdadm.conf",
    "sudo mdadm --examine --scan --config=/etc/mdadm/mdadm.conf >> /etc/mdadm/mdadm.conf",
];

const CASSANDRA_DIRS: &str = "/var/log/cassandra /var/run/cassandra /mnt/cassandra-data \
     /mnt/cassandra-gclog /mnt/cassandra-caches /mnt/cassandra-commitlogs";

/// Builds the per-cluster recipes that depend on who logs in and what is
/// pushed.
#[derive(Debug, Clone)]
pub struct Recipes {
    pub user: String,
    pub cassandra_version: String,
    pub cassandra_config: PathBuf,
    pub cassandra_env: PathBuf,
    /// Local `whalebone-client` binary shipped to `~/bin`.
    pub client_binary: PathBuf,
}

impl Recipes {
    fn home(&self) -> String {
        format!("/home/{}", self.user)
    }

    fn client(&self) -> String {
        format!("{}/bin/whalebone-client", self.home())
    }

    pub fn setup_barrier(&self) -> Vec<Step> {
        vec![Step::run("wait for setup", SETUP_COMPLETE_WAIT)]
    }

    /// Client binary plus this cluster's host files.
    pub fn install_client(&self, public_names: &Path, private_names: &Path) -> Vec<Step> {
        let home = self.home();
        vec![
            Step::run("create ~/bin", format!("mkdir -p {home}/bin")),
            Step::push("push client", &self.client_binary, self.client()),
            Step::run("make client executable", format!("chmod a+x {}", self.client())),
            Step::push("push public names", public_names, format!("{home}/boxen.public")),
            Step::push("push private names", private_names, format!("{home}/boxen.private")),
        ]
    }

    pub fn download_cassandra(&self) -> Vec<Step> {
        vec![Step::run(
            "install cassandra",
            format!(
                "{} download-cassandra --version {} --owner {}",
                self.client(),
                self.cassandra_version,
                self.user
            ),
        )]
    }

    pub fn push_config(&self) -> Vec<Step> {
        vec![
            Step::push(
                "push cassandra.yaml",
                &self.cassandra_config,
                format!("{CASSANDRA_HOME}/conf/cassandra.yaml"),
            ),
            Step::push(
                "push cassandra-env.sh",
                &self.cassandra_env,
                format!("{CASSANDRA_HOME}/conf/cassandra-env.sh"),
            ),
            Step::run("modify config", format!("{} modify-config", self.client())),
        ]
    }

    /// Everything a freshly launched cluster needs after ssh is up.
    pub fn bootstrap(&self, public_names: &Path, private_names: &Path) -> Vec<Step> {
        let mut steps = self.setup_barrier();
        steps.extend(self.install_client(public_names, private_names));
        steps.extend(self.download_cassandra());
        steps.extend(self.push_config());
        steps
    }

    pub fn mkdirs(&self) -> Vec<Step> {
        let user = &self.user;
        vec![
            Step::run(
                "create cassandra dirs",
                format!("sudo mkdir -p -m 0755 {CASSANDRA_DIRS}"),
            ),
            Step::run(
                "own cassandra dirs",
                format!("sudo chown {user}:{user} {CASSANDRA_DIRS}"),
            ),
            Step::run("create /mnt/public", "sudo mkdir -p /mnt/public"),
            Step::run("own /mnt/public", format!("sudo chown {user}:{user} /mnt/public")),
            Step::run("open /mnt/public", "sudo chmod a+rwx /mnt/public"),
        ]
    }

    pub fn build_raid(&self) -> Vec<Step> {
        let mut steps: Vec<Step> = RAID.iter().map(|c| Step::run(*c, *c)).collect();
        steps.extend(self.mkdirs());
        steps
    }

    pub fn start(&self) -> Vec<Step> {
        let user = &self.user;
        vec![
            Step::run(
                "prepare pid dir",
                format!(
                    "sudo mkdir -p -m 0755 /var/run/cassandra && sudo chown {user}:{user} /var/run/cassandra"
                ),
            ),
            Step::run(
                "start cassandra",
                format!("{CASSANDRA_HOME}/bin/cassandra -p /var/run/cassandra/cassandra.pid"),
            ),
        ]
    }

    pub fn stress(&self, options: &str) -> String {
        format!(
            "cd {CASSANDRA_SRC} && contrib/py_stress/stress.py --keep-going -i 1 -D ~/remote_boxen.private {options}"
        )
    }

    /// Another cluster's host files, as `~/remote_boxen.*`.
    pub fn push_client_config(&self, public_names: &Path, private_names: &Path) -> Vec<Step> {
        let home = self.home();
        vec![
            Step::push(
                "push remote public names",
                public_names,
                format!("{home}/remote_boxen.public"),
            ),
            Step::push(
                "push remote private names",
                private_names,
                format!("{home}/remote_boxen.private"),
            ),
        ]
    }

    pub fn push_local_cassandra(&self, local_dir: &Path) -> Vec<Step> {
        vec![Step::mirror("push local cassandra", local_dir, CASSANDRA_HOME)]
    }

    pub fn push_pub_key(&self, key: &Path) -> Vec<Step> {
        vec![Step::pipe("push public key", key, APPEND_AUTHORIZED_KEY)]
    }
}
