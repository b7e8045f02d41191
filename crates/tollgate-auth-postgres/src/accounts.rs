//! Temporary accounts, users, roles and the promotion transaction.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgConnection;
use time::OffsetDateTime;
use tollgate_auth::storage::{AccountStorage, RoleStorage, SubjectDirectory};
use tollgate_auth::types::{
    Image, PlannedTarget, PromotionOutcome, PromotionPlan, Role, Scope, SubjectContact,
    SubjectKind, SubjectRef, TeacherWaiting, TemporaryAccount, User, VerificationCode,
};
use tollgate_auth::{AuthError, AuthResult};
use uuid::Uuid;

use crate::verification::upsert_code;
use crate::{PgPool, PostgresAuthStorage, StorageError, db_error};

type TemporaryRow = (
    Uuid,
    String,
    String,
    String,
    Option<String>,
    OffsetDateTime,
    OffsetDateTime,
);

type UserRow = (Uuid, String, String, String, Uuid, String, OffsetDateTime);

const USER_COLUMNS: &str = r#"
    SELECT u.id, u.username, u.email, u.password_hash, u.role_id, r.name, u.created_at
    FROM users u
    JOIN roles r ON r.id = u.role_id
    WHERE u.deleted_at IS NULL
"#;

fn temporary_from_row(kind: SubjectKind, row: TemporaryRow) -> TemporaryAccount {
    let (id, username, email, password_hash, subject_name, created_at, updated_at) = row;
    TemporaryAccount {
        id,
        kind,
        username,
        email,
        password_hash,
        subject_name,
        created_at,
        updated_at,
    }
}

fn user_from_row(row: UserRow) -> User {
    let (id, username, email, password_hash, role_id, role_name, created_at) = row;
    User {
        id,
        username,
        email,
        password_hash,
        role_id,
        role_name,
        created_at,
    }
}

fn temporary_table(kind: SubjectKind) -> AuthResult<&'static str> {
    if kind.is_temporary() {
        Ok(kind.table_name())
    } else {
        Err(AuthError::invalid_field(
            "subject_type",
            format!("{kind} is not a temporary account"),
        ))
    }
}

pub(crate) async fn fetch_user(pool: &PgPool, id: Uuid) -> AuthResult<Option<User>> {
    let sql = format!("{USER_COLUMNS} AND u.id = $1");
    let row: Option<UserRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?;
    Ok(row.map(user_from_row))
}

/// Soft-deleted rows still count: their unique keys stay reserved.
async fn is_taken(conn: &mut PgConnection, username: &str, email: &str) -> AuthResult<bool> {
    query_scalar(
        r#"
        SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 OR email = $2)
            OR EXISTS (SELECT 1 FROM teacher_waitings WHERE username = $1 OR email = $2)
        "#,
    )
    .bind(username)
    .bind(email)
    .fetch_one(conn)
    .await
    .map_err(db_error)
}

async fn insert_user(conn: &mut PgConnection, user: &User, image: &Image) -> AuthResult<()> {
    query(
        r#"
        INSERT INTO users (id, username, email, password_hash, role_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role_id)
    .bind(user.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    query("INSERT INTO images (id, user_id, file_name, url) VALUES ($1, $2, $3, $4)")
        .bind(image.id)
        .bind(image.user_id)
        .bind(&image.file_name)
        .bind(&image.url)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// Inserts the role unless one with the same name exists. Returns the stored
/// role and whether it was created.
async fn find_or_create_role(conn: &mut PgConnection, role: &Role) -> AuthResult<(Role, bool)> {
    let inserted: Option<Uuid> = query_scalar(
        r#"
        INSERT INTO roles (id, name, description) VALUES ($1, $2, $3)
        ON CONFLICT (name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(role.id)
    .bind(&role.name)
    .bind(&role.description)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    let stored = load_role(&mut *conn, &role.name)
        .await?
        .ok_or_else(|| AuthError::conflict(format!("role {} is deleted", role.name)))?;
    Ok((stored, inserted.is_some()))
}

async fn load_role(conn: &mut PgConnection, name: &str) -> AuthResult<Option<Role>> {
    let row: Option<(Uuid, String, String, Vec<String>)> = query_as(
        r#"
        SELECT r.id, r.name, r.description,
               COALESCE(ARRAY_AGG(rs.scope_name ORDER BY rs.scope_name)
                        FILTER (WHERE rs.scope_name IS NOT NULL), '{}')
        FROM roles r
        LEFT JOIN role_scopes rs ON rs.role_id = r.id
        WHERE r.name = $1 AND r.deleted_at IS NULL
        GROUP BY r.id
        "#,
    )
    .bind(name)
    .fetch_optional(conn)
    .await
    .map_err(db_error)?;

    Ok(row.map(|(id, name, description, scopes)| Role {
        id,
        name,
        description,
        scopes,
    }))
}

async fn link_scopes(conn: &mut PgConnection, role_id: Uuid, scopes: &[String]) -> AuthResult<()> {
    query(
        r#"
        INSERT INTO role_scopes (role_id, scope_name)
        SELECT $1, s.name FROM scopes s WHERE s.name = ANY($2) AND s.deleted_at IS NULL
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(role_id)
    .bind(scopes)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

#[async_trait]
impl SubjectDirectory for PostgresAuthStorage {
    async fn resolve(&self, subject: SubjectRef) -> AuthResult<SubjectContact> {
        let sql = format!(
            "SELECT username, email FROM {} WHERE id = $1 AND deleted_at IS NULL",
            subject.kind.table_name()
        );
        let row: Option<(String, String)> = query_as(&sql)
            .bind(subject.id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_error)?;
        let (username, email) = row.ok_or_else(|| AuthError::not_found(subject.to_string()))?;
        Ok(SubjectContact {
            subject,
            username,
            email,
        })
    }

    async fn find_by_username(&self, kind: SubjectKind, username: &str) -> AuthResult<SubjectRef> {
        let sql = format!(
            "SELECT id FROM {} WHERE username = $1 AND deleted_at IS NULL",
            kind.table_name()
        );
        let id: Option<Uuid> = query_scalar(&sql)
            .bind(username)
            .fetch_optional(self.pool())
            .await
            .map_err(db_error)?;
        id.map(|id| SubjectRef::new(kind, id))
            .ok_or_else(|| AuthError::not_found(format!("{kind} {username}")))
    }
}

#[async_trait]
impl AccountStorage for PostgresAuthStorage {
    async fn create_temporary(&self, account: &TemporaryAccount) -> AuthResult<()> {
        let mut conn = self.pool().acquire().await.map_err(db_error)?;
        insert_temporary(&mut conn, account).await
    }

    #[tracing::instrument(skip_all, fields(kind = %account.kind, username = %account.username))]
    async fn save_registration(
        &self,
        account: &TemporaryAccount,
        refresh: bool,
        code_hash: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<VerificationCode> {
        let mut tx = self.pool().begin().await.map_err(db_error)?;

        if is_taken(&mut tx, &account.username, &account.email).await? {
            return Err(AuthError::conflict(format!(
                "username or email already registered: {}",
                account.username
            )));
        }
        if refresh {
            update_temporary(&mut tx, account).await?;
        } else {
            insert_temporary(&mut tx, account).await?;
        }
        let code = upsert_code(&mut tx, account.subject(), code_hash, expires_at, self.now()).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(code)
    }

    async fn find_temporary(&self, kind: SubjectKind, id: Uuid) -> AuthResult<TemporaryAccount> {
        let sql = format!(
            r#"
            SELECT id, username, email, password_hash, subject_name, created_at, updated_at
            FROM {} WHERE id = $1 AND deleted_at IS NULL
            "#,
            temporary_table(kind)?
        );
        let row: Option<TemporaryRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_error)?;
        row.map(|row| temporary_from_row(kind, row))
            .ok_or_else(|| AuthError::not_found(SubjectRef::new(kind, id).to_string()))
    }

    async fn find_temporary_by_username(
        &self,
        kind: SubjectKind,
        username: &str,
    ) -> AuthResult<Option<TemporaryAccount>> {
        let sql = format!(
            r#"
            SELECT id, username, email, password_hash, subject_name, created_at, updated_at
            FROM {} WHERE username = $1 AND deleted_at IS NULL
            "#,
            temporary_table(kind)?
        );
        let row: Option<TemporaryRow> = query_as(&sql)
            .bind(username)
            .fetch_optional(self.pool())
            .await
            .map_err(db_error)?;
        Ok(row.map(|row| temporary_from_row(kind, row)))
    }

    async fn is_taken(&self, username: &str, email: &str) -> AuthResult<bool> {
        let mut conn = self.pool().acquire().await.map_err(db_error)?;
        is_taken(&mut conn, username, email).await
    }

    async fn find_user_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let sql = format!("{USER_COLUMNS} AND u.username = $1");
        let row: Option<UserRow> = query_as(&sql)
            .bind(username)
            .fetch_optional(self.pool())
            .await
            .map_err(db_error)?;
        Ok(row.map(user_from_row))
    }

    async fn create_user(&self, user: &User, image: &Image) -> AuthResult<()> {
        let mut tx = self.pool().begin().await.map_err(db_error)?;
        insert_user(&mut tx, user, image).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(kind = %plan.temporary.kind, username = %plan.temporary.username))]
    async fn promote(&self, plan: &PromotionPlan) -> AuthResult<PromotionOutcome> {
        let temporary = &plan.temporary;
        let table = temporary_table(temporary.kind)?;
        let mut tx = self.pool().begin().await.map_err(db_error)?;

        let consumed = query("UPDATE verification_codes SET used_at = $2 WHERE id = $1 AND used_at IS NULL")
            .bind(plan.code_id)
            .bind(plan.promoted_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        if consumed.rows_affected() == 0 {
            let exists: bool =
                query_scalar("SELECT EXISTS (SELECT 1 FROM verification_codes WHERE id = $1)")
                    .bind(plan.code_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_error)?;
            return Err(if exists {
                AuthError::AlreadyUsed
            } else {
                AuthError::not_found("verification code")
            });
        }

        let lock_sql =
            format!("SELECT id FROM {table} WHERE id = $1 AND deleted_at IS NULL FOR UPDATE");
        let locked: Option<Uuid> = query_scalar(&lock_sql)
            .bind(temporary.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        if locked.is_none() {
            return Err(AuthError::not_found(temporary.subject().to_string()));
        }

        if is_taken(&mut tx, &temporary.username, &temporary.email).await? {
            return Err(AuthError::conflict(format!(
                "username or email already registered: {}",
                temporary.username
            )));
        }

        let outcome = match &plan.target {
            PlannedTarget::User { role, image } => {
                let (stored_role, created) = find_or_create_role(&mut tx, role).await?;
                if created {
                    query("SAVEPOINT scope_link")
                        .execute(&mut *tx)
                        .await
                        .map_err(db_error)?;
                    match link_scopes(&mut tx, stored_role.id, &role.scopes).await {
                        Ok(()) => {
                            query("RELEASE SAVEPOINT scope_link")
                                .execute(&mut *tx)
                                .await
                                .map_err(db_error)?;
                        }
                        Err(e) => {
                            tracing::warn!(role = %stored_role.name, error = %e, "Failed to link default scopes to role");
                            query("ROLLBACK TO SAVEPOINT scope_link")
                                .execute(&mut *tx)
                                .await
                                .map_err(db_error)?;
                        }
                    }
                }

                let user = User {
                    id: Uuid::new_v4(),
                    username: temporary.username.clone(),
                    email: temporary.email.clone(),
                    password_hash: temporary.password_hash.clone(),
                    role_id: stored_role.id,
                    role_name: stored_role.name.clone(),
                    created_at: plan.promoted_at,
                };
                let image = Image {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    file_name: image.file_name.clone(),
                    url: image.url.clone(),
                };
                insert_user(&mut tx, &user, &image).await?;
                PromotionOutcome::Account { user, image }
            }
            PlannedTarget::TeacherWaiting => {
                let waiting = TeacherWaiting {
                    id: Uuid::new_v4(),
                    username: temporary.username.clone(),
                    email: temporary.email.clone(),
                    password_hash: temporary.password_hash.clone(),
                    subject_name: temporary.subject_name.clone(),
                    created_at: plan.promoted_at,
                };
                query(
                    r#"
                    INSERT INTO teacher_waitings (id, username, email, password_hash, subject_name, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(waiting.id)
                .bind(&waiting.username)
                .bind(&waiting.email)
                .bind(&waiting.password_hash)
                .bind(&waiting.subject_name)
                .bind(waiting.created_at)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                PromotionOutcome::AwaitingApproval(waiting)
            }
        };

        query("SAVEPOINT temporary_cleanup")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        let cleanup = delete_temporary(&mut tx, table, temporary).await;
        if let Err(e) = &cleanup {
            query("ROLLBACK TO SAVEPOINT temporary_cleanup")
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            tx.commit().await.map_err(db_error)?;
            return Err(AuthError::destroy(
                outcome.account_id(),
                temporary.id,
                e.to_string(),
            ));
        }

        tx.commit().await.map_err(db_error)?;
        Ok(outcome)
    }
}

async fn insert_temporary(conn: &mut PgConnection, account: &TemporaryAccount) -> AuthResult<()> {
    let sql = format!(
        r#"
        INSERT INTO {} (id, username, email, password_hash, subject_name, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
        temporary_table(account.kind)?
    );
    query(&sql)
        .bind(account.id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.subject_name)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(conn)
        .await
        .map_err(|e| {
            let err = StorageError::from(e);
            if err.is_unique_violation() {
                AuthError::conflict(format!(
                    "{} {} already exists",
                    account.kind, account.username
                ))
            } else {
                err.into()
            }
        })?;
    Ok(())
}

async fn update_temporary(conn: &mut PgConnection, account: &TemporaryAccount) -> AuthResult<()> {
    let sql = format!(
        r#"
        UPDATE {}
        SET email = $2, password_hash = $3, subject_name = $4, updated_at = $5
        WHERE id = $1 AND deleted_at IS NULL
        "#,
        temporary_table(account.kind)?
    );
    let result = query(&sql)
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.subject_name)
        .bind(account.updated_at)
        .execute(conn)
        .await
        .map_err(db_error)?;
    if result.rows_affected() == 0 {
        return Err(AuthError::not_found(account.subject().to_string()));
    }
    Ok(())
}

async fn delete_temporary(
    conn: &mut PgConnection,
    table: &str,
    temporary: &TemporaryAccount,
) -> AuthResult<()> {
    query("DELETE FROM verification_codes WHERE subject_type = $1 AND subject_id = $2")
        .bind(temporary.kind.as_str())
        .bind(temporary.id)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    let sql = format!("DELETE FROM {table} WHERE id = $1");
    let deleted = query(&sql)
        .bind(temporary.id)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    if deleted.rows_affected() == 0 {
        return Err(AuthError::not_found(temporary.subject().to_string()));
    }
    Ok(())
}

#[async_trait]
impl RoleStorage for PostgresAuthStorage {
    async fn find_or_create_role(&self, role: &Role) -> AuthResult<Role> {
        let mut conn = self.pool().acquire().await.map_err(db_error)?;
        let (role, _) = find_or_create_role(&mut conn, role).await?;
        Ok(role)
    }

    async fn find_role(&self, name: &str) -> AuthResult<Option<Role>> {
        let mut conn = self.pool().acquire().await.map_err(db_error)?;
        load_role(&mut conn, name).await
    }

    async fn upsert_scope(&self, scope: &Scope) -> AuthResult<bool> {
        let result = query(
            "INSERT INTO scopes (name, description) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(&scope.name)
        .bind(&scope.description)
        .execute(self.pool())
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn link_scopes(&self, role_id: Uuid, scopes: &[String]) -> AuthResult<()> {
        let exists: bool = query_scalar("SELECT EXISTS (SELECT 1 FROM roles WHERE id = $1)")
            .bind(role_id)
            .fetch_one(self.pool())
            .await
            .map_err(db_error)?;
        if !exists {
            return Err(AuthError::not_found(format!("role {role_id}")));
        }
        let mut conn = self.pool().acquire().await.map_err(db_error)?;
        link_scopes(&mut conn, role_id, scopes).await
    }
}
