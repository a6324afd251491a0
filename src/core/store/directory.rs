use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use super::{Store, json_column};
use crate::core::models::{AgentType, Organization, Role, User};

const USER_COLUMNS: &str = "id, org_id, username, display_name, role_id, is_system_persona";
const ROLE_COLUMNS: &str = "id, org_id, code, name, system_prompt, prompt_file, model_name, \
     agent_type, agent_config, tool_names, is_active";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        org_id: row.get(1)?,
        username: row.get(2)?,
        display_name: row.get(3)?,
        role_id: row.get(4)?,
        is_system_persona: row.get(5)?,
    })
}

fn role_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Role> {
    let agent_type: String = row.get(7)?;
    Ok(Role {
        id: row.get(0)?,
        org_id: row.get(1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        system_prompt: row.get(4)?,
        prompt_file: row.get(5)?,
        model_name: row.get(6)?,
        agent_type: AgentType::from_config(&agent_type),
        agent_config: json_column(row, 8)?,
        tool_names: json_column(row, 9)?,
        is_active: row.get(10)?,
    })
}

impl Store {
    pub async fn insert_organization(&self, org: &Organization) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO organizations (id, name, code) VALUES (?1, ?2, ?3)",
            params![org.id, org.name, org.code],
        )?;
        Ok(())
    }

    pub async fn get_organization(&self, id: &str) -> Result<Option<Organization>> {
        let db = self.db.lock().await;
        let org = db
            .query_row(
                "SELECT id, name, code FROM organizations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Organization {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        code: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(org)
    }

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO users (id, org_id, username, display_name, role_id, is_system_persona)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.org_id,
                user.username,
                user.display_name,
                user.role_id,
                user.is_system_persona
            ],
        )?;
        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let db = self.db.lock().await;
        let user = db
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Usernames are unique per organization and matched exactly.
    pub async fn find_user_by_username(&self, org_id: &str, username: &str) -> Result<Option<User>> {
        let db = self.db.lock().await;
        let user = db
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE org_id = ?1 AND username = ?2",
                    USER_COLUMNS
                ),
                params![org_id, username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub async fn set_user_role(&self, user_id: &str, role_id: Option<&str>) -> Result<bool> {
        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE users SET role_id = ?2 WHERE id = ?1",
            params![user_id, role_id],
        )?;
        Ok(updated > 0)
    }

    pub async fn insert_role(&self, role: &Role) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO roles (id, org_id, code, name, system_prompt, prompt_file, model_name,
                                agent_type, agent_config, tool_names, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                role.id,
                role.org_id,
                role.code,
                role.name,
                role.system_prompt,
                role.prompt_file,
                role.model_name,
                role.agent_type.as_str(),
                serde_json::to_string(&role.agent_config)?,
                serde_json::to_string(&role.tool_names)?,
                role.is_active
            ],
        )?;
        Ok(())
    }

    pub async fn get_role(&self, id: &str) -> Result<Option<Role>> {
        let db = self.db.lock().await;
        let role = db
            .query_row(
                &format!("SELECT {} FROM roles WHERE id = ?1", ROLE_COLUMNS),
                params![id],
                role_from_row,
            )
            .optional()?;
        Ok(role)
    }

    pub async fn set_role_active(&self, id: &str, active: bool) -> Result<bool> {
        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE roles SET is_active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        Ok(updated > 0)
    }
}
