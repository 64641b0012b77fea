// Skills Management
// Discovery, parsing and management of SKILL.md-based skills for the
// managed coding assistants.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SkillLocation {
    Project,
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SkillConflictPolicy {
    Skip,
    Overwrite,
    Rename,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
    pub location: SkillLocation,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillContent {
    pub info: SkillInfo,
    pub content: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillTemplateInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub requires: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SkillFrontmatter {
    name: String,
    description: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    /// Optional runtime/tool hints for the UI (e.g. `python`, `node`).
    #[serde(default)]
    requires: Option<Vec<String>>,
}

/// Validate a skill name: lowercase alphanumeric with single hyphens,
/// 1-64 characters.
pub fn validate_skill_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 64 {
        return Err("Skill name must be 1-64 characters".to_string());
    }

    let chars: Vec<char> = name.chars().collect();
    if chars.first() == Some(&'-') || chars.last() == Some(&'-') {
        return Err("Skill name cannot start or end with a hyphen".to_string());
    }

    let mut prev_was_hyphen = false;
    for c in chars {
        if c == '-' {
            if prev_was_hyphen {
                return Err("Skill name cannot contain consecutive hyphens".to_string());
            }
            prev_was_hyphen = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_was_hyphen = false;
        } else {
            return Err("Skill name must be lowercase alphanumeric with hyphens only".to_string());
        }
    }

    Ok(())
}

/// Parse a SKILL.md into (frontmatter, body).
pub fn parse_skill_content(content: &str) -> Result<(SkillInfo, String), String> {
    let lines: Vec<&str> = content.lines().collect();

    let mut frontmatter_start = None;
    let mut frontmatter_end = None;
    for (i, line) in lines.iter().enumerate() {
        if line.trim() == "---" {
            if frontmatter_start.is_none() {
                frontmatter_start = Some(i);
            } else if frontmatter_end.is_none() {
                frontmatter_end = Some(i);
                break;
            }
        }
    }

    let (start, end) = match (frontmatter_start, frontmatter_end) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => {
            return Err(
                "Invalid SKILL.md format: missing or malformed frontmatter (---...---)".to_string(),
            )
        }
    };

    let frontmatter_yaml = repair_unquoted_description(lines[start + 1..end].join("\n"));

    let frontmatter: SkillFrontmatter = serde_yaml::from_str(&frontmatter_yaml)
        .map_err(|e| format!("Failed to parse frontmatter: {}", e))?;

    validate_skill_name(&frontmatter.name)?;

    let body = if end + 1 < lines.len() {
        lines[end + 1..].join("\n")
    } else {
        String::new()
    };

    let info = SkillInfo {
        name: frontmatter.name,
        description: frontmatter.description,
        location: SkillLocation::Global,
        path: String::new(),
        version: frontmatter.version,
        author: frontmatter.author,
        tags: frontmatter.tags.unwrap_or_default(),
        requires: frontmatter.requires.unwrap_or_default(),
    };
    Ok((info, body))
}

/// Unquoted descriptions containing colons ("for: (1) ...") break YAML;
/// wrap them in quotes before parsing.
fn repair_unquoted_description(mut yaml: String) -> String {
    let Some(desc_start) = yaml.find("description:") else {
        return yaml;
    };
    let after_key = desc_start + "description:".len();
    let Some(value_offset) = yaml[after_key..].find(|c: char| !c.is_whitespace()) else {
        return yaml;
    };
    let value_pos = after_key + value_offset;
    let first = yaml.chars().nth(value_pos).unwrap_or(' ');
    if first == '"' || first == '\'' {
        return yaml;
    }
    let line_end = yaml[value_pos..]
        .find('\n')
        .map(|i| value_pos + i)
        .unwrap_or(yaml.len());
    let value = yaml[value_pos..line_end].to_string();
    if value.contains(':') {
        let quoted = format!("\"{}\"", value.trim().replace('"', "'"));
        yaml.replace_range(value_pos..line_end, &quoted);
    }
    yaml
}

#[derive(Debug, Clone)]
pub struct SkillService {
    workspace_root: Option<PathBuf>,
    global_root: PathBuf,
    template_root: Option<PathBuf>,
}

impl SkillService {
    /// Default roots: `.claude/skills` inside the workspace, the per-user
    /// skills directory globally.
    pub fn for_workspace(workspace_root: Option<PathBuf>) -> Self {
        let global_root = dirs::home_dir()
            .map(|home| home.join(".claude").join("skills"))
            .unwrap_or_else(|| PathBuf::from(".claude/skills"));
        Self {
            workspace_root,
            global_root,
            template_root: None,
        }
    }

    pub fn with_roots(
        workspace_root: Option<PathBuf>,
        global_root: PathBuf,
        template_root: Option<PathBuf>,
    ) -> Self {
        Self {
            workspace_root,
            global_root,
            template_root,
        }
    }

    fn skill_roots(&self) -> Vec<(PathBuf, SkillLocation)> {
        let mut roots = Vec::new();
        if let Some(ws) = &self.workspace_root {
            roots.push((
                ws.join(".claude").join("skills"),
                SkillLocation::Project,
            ));
        }
        roots.push((self.global_root.clone(), SkillLocation::Global));
        roots
    }

    fn root_for(&self, location: &SkillLocation) -> Result<PathBuf, String> {
        match location {
            SkillLocation::Global => Ok(self.global_root.clone()),
            SkillLocation::Project => self
                .workspace_root
                .as_ref()
                .map(|ws| ws.join(".claude").join("skills"))
                .ok_or_else(|| {
                    "Cannot manage project skills without an active workspace".to_string()
                }),
        }
    }

    /// Discover installed skills. Project skills shadow global ones with
    /// the same name.
    pub fn list_skills(&self) -> Vec<SkillInfo> {
        let mut skills = Vec::new();
        let mut seen_names = HashSet::new();

        for (root, location) in self.skill_roots() {
            if !root.is_dir() {
                continue;
            }
            let Ok(entries) = fs::read_dir(&root) else {
                tracing::warn!(root = %root.display(), "failed to read skills directory");
                continue;
            };
            for entry in entries.flatten() {
                if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                let skill_file = entry.path().join("SKILL.md");
                let Ok(content) = fs::read_to_string(&skill_file) else {
                    continue;
                };
                match parse_skill_content(&content) {
                    Ok((mut info, _body)) => {
                        if !seen_names.insert(info.name.to_ascii_lowercase()) {
                            continue;
                        }
                        info.location = location.clone();
                        info.path = entry.path().to_string_lossy().to_string();
                        skills.push(info);
                    }
                    Err(e) => {
                        tracing::warn!(path = %skill_file.display(), error = %e, "skipping invalid skill");
                    }
                }
            }
        }

        skills.sort_by(|a, b| {
            let rank = |loc: &SkillLocation| match loc {
                SkillLocation::Project => 0,
                SkillLocation::Global => 1,
            };
            rank(&a.location)
                .cmp(&rank(&b.location))
                .then_with(|| a.name.cmp(&b.name))
        });
        skills
    }

    pub fn load_skill(&self, name: &str) -> Result<Option<SkillContent>, String> {
        let target = name.trim();
        if target.is_empty() {
            return Ok(None);
        }
        for (root, location) in self.skill_roots() {
            let skill_dir = root.join(target);
            let skill_file = skill_dir.join("SKILL.md");
            if !skill_file.exists() {
                continue;
            }
            let content = fs::read_to_string(&skill_file)
                .map_err(|e| format!("Failed to read {:?}: {}", skill_file, e))?;
            let (mut info, _body) = parse_skill_content(&content)?;
            info.location = location;
            info.path = skill_dir.to_string_lossy().to_string();
            return Ok(Some(SkillContent {
                info,
                content,
                files: companion_files(&skill_dir, 20),
            }));
        }
        Ok(None)
    }

    /// Import a skill from raw SKILL.md content, honoring the conflict
    /// policy for existing skills of the same name.
    pub fn import_skill_from_content(
        &self,
        content: &str,
        location: SkillLocation,
        conflict_policy: SkillConflictPolicy,
    ) -> Result<Option<SkillInfo>, String> {
        let (mut info, _body) = parse_skill_content(content)?;
        let base_dir = self.root_for(&location)?;

        let mut final_name = info.name.clone();
        if base_dir.join(&final_name).exists() {
            match conflict_policy {
                SkillConflictPolicy::Skip => {
                    tracing::info!(skill = %final_name, "skill exists, import skipped");
                    return Ok(None);
                }
                SkillConflictPolicy::Overwrite => {}
                SkillConflictPolicy::Rename => {
                    final_name = resolve_conflict_name(&base_dir, &final_name);
                }
            }
        }

        let target_dir = base_dir.join(&final_name);
        fs::create_dir_all(&target_dir)
            .map_err(|e| format!("Failed to create {:?}: {}", target_dir, e))?;
        fs::write(target_dir.join("SKILL.md"), content)
            .map_err(|e| format!("Failed to write {:?}: {}", target_dir, e))?;

        tracing::info!(skill = %final_name, "skill imported");
        info.name = final_name;
        info.location = location;
        info.path = target_dir.to_string_lossy().to_string();
        Ok(Some(info))
    }

    /// Delete an installed skill directory. Refuses names that escape the
    /// managed root.
    pub fn delete_skill(&self, name: &str, location: SkillLocation) -> Result<(), String> {
        validate_skill_name(name)?;
        let base_dir = self.root_for(&location)?;
        let skill_dir = base_dir.join(name);
        if !skill_dir.join("SKILL.md").exists() {
            return Err(format!("Skill not found: {}", name));
        }
        fs::remove_dir_all(&skill_dir).map_err(|e| format!("Failed to delete {:?}: {}", skill_dir, e))?;
        tracing::info!(skill = %name, "skill deleted");
        Ok(())
    }

    /// Serialize the installed-skill inventory for the export dialog.
    pub fn export_skills_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(&self.list_skills())
            .map_err(|e| format!("Failed to serialize skill list: {}", e))
    }

    pub fn list_templates(&self) -> Result<Vec<SkillTemplateInfo>, String> {
        let Some(templates_dir) = &self.template_root else {
            return Ok(Vec::new());
        };
        if !templates_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(templates_dir)
            .map_err(|e| format!("Failed to read {:?}: {}", templates_dir, e))?;

        let mut out = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            let skill_file = entry.path().join("SKILL.md");
            let Ok(content) = fs::read_to_string(&skill_file) else {
                continue;
            };
            match parse_skill_content(&content) {
                Ok((info, _)) => out.push(SkillTemplateInfo {
                    id,
                    name: info.name,
                    description: info.description,
                    requires: info.requires,
                }),
                Err(e) => {
                    tracing::warn!(path = %skill_file.display(), error = %e, "skipping invalid skill template");
                }
            }
        }

        out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(out)
    }

    pub fn install_template(
        &self,
        template_id: &str,
        location: SkillLocation,
        conflict_policy: SkillConflictPolicy,
    ) -> Result<Option<SkillInfo>, String> {
        let Some(templates_dir) = &self.template_root else {
            return Err("No skill templates directory configured".to_string());
        };
        let skill_file = templates_dir.join(template_id).join("SKILL.md");
        if !skill_file.exists() {
            return Err(format!("Skill template not found: {}", template_id));
        }
        let content = fs::read_to_string(&skill_file)
            .map_err(|e| format!("Failed to read {:?}: {}", skill_file, e))?;
        self.import_skill_from_content(&content, location, conflict_policy)
    }
}

fn resolve_conflict_name(base_dir: &Path, name: &str) -> String {
    for i in 2..100 {
        let candidate = format!("{}-{}", name, i);
        if !base_dir.join(&candidate).exists() {
            return candidate;
        }
    }
    format!("{}-copy", name)
}

fn companion_files(skill_dir: &Path, limit: usize) -> Vec<String> {
    let mut files = Vec::new();
    for entry in WalkDir::new(skill_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .flatten()
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(skill_dir) {
            files.push(rel.to_string_lossy().to_string());
        }
        if files.len() >= limit {
            break;
        }
    }
    files
}
