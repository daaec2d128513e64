use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use tempfile::TempDir;

/// Spawns a real `commons` server (release binary) over a throwaway data
/// directory, initialized with a fresh admin token.
pub struct TestServer {
    pub base_url: String,
    pub admin_token: String,
    // Held so the data directory outlives the server process.
    _temp_dir: TempDir,
    server_process: Option<Child>,
}

static BINARY: LazyLock<PathBuf> = LazyLock::new(|| {
    let build_status = Command::new("cargo")
        .args(["build", "--release"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("build release binary");
    assert!(build_status.success(), "Failed to build release binary");
    Path::new(env!("CARGO_MANIFEST_DIR")).join("target/release/commons")
});

fn init_data_dir(data_dir: &Path) -> String {
    let init_output = Command::new(&*BINARY)
        .args(["admin", "init", "--non-interactive", "--data-dir"])
        .arg(data_dir)
        .output()
        .expect("run init");
    assert!(
        init_output.status.success(),
        "Failed to initialize database"
    );

    std::fs::read_to_string(data_dir.join(".admin_token"))
        .expect("read admin token")
        .trim()
        .to_string()
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_args(&[]).await
    }

    /// Starts a server with extra `serve` flags, e.g. `--disable-groups`.
    pub async fn start_with_args(extra_args: &[&str]) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let admin_token = init_data_dir(temp_dir.path());

        let port = free_port();
        let base_url = format!("http://127.0.0.1:{port}");

        let server_process = Command::new(&*BINARY)
            .args(["serve", "--host", "127.0.0.1"])
            .args(["--port", &port.to_string()])
            .arg("--data-dir")
            .arg(temp_dir.path())
            .args(extra_args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("start server");

        let server = Self {
            base_url,
            admin_token,
            _temp_dir: temp_dir,
            server_process: Some(server_process),
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", self.base_url))
                .send()
                .await
                .is_ok()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(mut process) = self.server_process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}
