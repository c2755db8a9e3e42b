//! On-disk solution fixtures
//!
//! Builds a solution descriptor, one project per secret identifier and a
//! separate user secrets root, all inside temporary directories.

use super::constants::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vs_secrets_sync::{Cipher, DiscoveredSolution, Discovery, KeyMaterial, SecretRepository, SyncContext};

/// A solution with projects declaring user secrets
pub struct SolutionFixture {
    pub repo: TempDir,
    pub secrets: TempDir,
    pub solution_path: PathBuf,
}

impl SolutionFixture {
    /// Solution `Contoso` with one project per secret identifier
    pub fn new(secrets_ids: &[&str]) -> Self {
        let repo = tempfile::tempdir().unwrap();
        let secrets = tempfile::tempdir().unwrap();

        let mut sln = String::from(
            "Microsoft Visual Studio Solution File, Format Version 12.00\n# Visual Studio Version 17\n",
        );
        for (index, id) in secrets_ids.iter().enumerate() {
            let project = format!("Project{}", index);
            let project_dir = repo.path().join(&project);
            std::fs::create_dir_all(&project_dir).unwrap();
            std::fs::write(
                project_dir.join(format!("{}.csproj", project)),
                format!(
                    "<Project Sdk=\"Microsoft.NET.Sdk.Web\">\n  <PropertyGroup>\n    <TargetFramework>net8.0</TargetFramework>\n    <UserSecretsId>{}</UserSecretsId>\n  </PropertyGroup>\n</Project>\n",
                    id
                ),
            )
            .unwrap();

            sln.push_str(&format!(
                "Project(\"{{9A19103F-16F7-4668-BE54-9A1E7A4F7556}}\") = \"{0}\", \"{0}\\{0}.csproj\", \"{{0000000{1}-0000-0000-0000-000000000000}}\"\nEndProject\n",
                project, index
            ));
        }
        sln.push_str(&format!(
            "Global\n\tGlobalSection(ExtensibilityGlobals) = postSolution\n\t\tSolutionGuid = {{{}}}\n\tEndGlobalSection\nEndGlobal\n",
            SOLUTION_GUID.to_uppercase()
        ));

        let solution_path = repo.path().join(format!("{}.sln", SOLUTION_NAME));
        std::fs::write(&solution_path, sln).unwrap();

        Self {
            repo,
            secrets,
            solution_path,
        }
    }

    pub fn secrets_root(&self) -> &Path {
        self.secrets.path()
    }

    pub fn secret_path(&self, secrets_id: &str) -> PathBuf {
        self.secrets_root().join(secrets_id).join("secrets.json")
    }

    pub fn write_secret(&self, secrets_id: &str, content: &str) {
        let path = self.secret_path(secrets_id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read_secret(&self, secrets_id: &str) -> Option<String> {
        std::fs::read_to_string(self.secret_path(secrets_id)).ok()
    }

    pub fn delete_secret(&self, secrets_id: &str) {
        std::fs::remove_file(self.secret_path(secrets_id)).unwrap();
    }

    /// Fresh discovery, reflecting the files currently on disk
    pub fn discover(&self) -> DiscoveredSolution {
        Discovery::new(self.secrets_root())
            .discover(&self.solution_path)
            .unwrap()
    }

    /// Context over `repository` with an in-memory key from `passphrase`
    pub fn context(&self, repository: impl SecretRepository + 'static, passphrase: &str) -> SyncContext {
        let cipher = Cipher::derive(&KeyMaterial::Passphrase(passphrase.to_string())).unwrap();
        SyncContext::new(cipher, Box::new(repository), self.secrets_root())
    }
}

/// Fixture with two projects, both carrying secrets
pub fn two_project_fixture() -> SolutionFixture {
    let fixture = SolutionFixture::new(&[API_SECRETS_ID, WORKER_SECRETS_ID]);
    fixture.write_secret(API_SECRETS_ID, API_SECRETS);
    fixture.write_secret(WORKER_SECRETS_ID, WORKER_SECRETS);
    fixture
}
