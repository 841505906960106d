use crate::Database;
use crate::models::UserRow;
use anyhow::Result;
use rusqlite::Connection;

const USER_COLUMNS: &str = "id, username, email, fullname, password, refresh_token, created_at";

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        fullname: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, fullname, password) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, username, email, fullname, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Overwrites the single active refresh token (login and rotation).
    /// Touches only the refresh_token column, so the stored password hash
    /// is never re-hashed by a token save.
    pub fn set_refresh_token(&self, id: &str, refresh_token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET refresh_token = ?2 WHERE id = ?1",
                (id, refresh_token),
            )?;
            Ok(())
        })
    }

    /// Logout: the user keeps their row, the token field goes away.
    pub fn clear_refresh_token(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET refresh_token = NULL WHERE id = ?1", [id])?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is one of the fixed identifiers above, never user input.
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                fullname: row.get(3)?,
                password: row.get(4)?,
                refresh_token: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u-1", "alice", "a@x.com", "Alice A", "$argon2id$stub")
            .unwrap();
        db
    }

    #[test]
    fn create_and_lookup() {
        let db = seeded();

        let by_name = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.email, "a@x.com");
        assert!(by_name.refresh_token.is_none());

        let by_email = db.get_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(by_email.id, "u-1");

        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_or_email_is_rejected() {
        let db = seeded();

        let dup_name = db.create_user("u-2", "alice", "b@x.com", "Other", "h");
        assert!(dup_name.is_err());

        let dup_email = db.create_user("u-3", "bob", "a@x.com", "Bob B", "h");
        assert!(dup_email.is_err());
    }

    #[test]
    fn refresh_token_set_and_clear() {
        let db = seeded();

        db.set_refresh_token("u-1", "tok-1").unwrap();
        let row = db.get_user_by_id("u-1").unwrap().unwrap();
        assert_eq!(row.refresh_token.as_deref(), Some("tok-1"));

        db.set_refresh_token("u-1", "tok-2").unwrap();
        let row = db.get_user_by_id("u-1").unwrap().unwrap();
        assert_eq!(row.refresh_token.as_deref(), Some("tok-2"));

        db.clear_refresh_token("u-1").unwrap();
        let row = db.get_user_by_id("u-1").unwrap().unwrap();
        assert!(row.refresh_token.is_none());

        // Clearing twice stays a no-op.
        db.clear_refresh_token("u-1").unwrap();
    }
}
