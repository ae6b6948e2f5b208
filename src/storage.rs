//! SQLite storage layer for Podium.
//!
//! Every component reads and writes through [`Storage`]; there is no
//! in-process cache. Table and column names follow the historical schema
//! (`Usuarios`, `Actividades`, `Logros`, ...), which other tools still read.
//!
//! Each method acquires a pooled connection for the duration of its own
//! statements and releases it before returning. Only competition
//! registration spans more than one statement in a transaction.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::error::{GameError, Result};
use crate::model::{
    Achievement, AchievementCategory, Activity, Challenge, ChallengeState, Competition,
    CompetitionState, RankingEntry, SportType, User,
};

/// Length of a participation window opened at registration.
const PARTICIPATION_DAYS: u64 = 10;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:podium.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS Usuarios (
                id TEXT PRIMARY KEY,
                nombre TEXT NOT NULL UNIQUE,
                nivel INTEGER NOT NULL DEFAULT 1,
                puntosTotales INTEGER NOT NULL DEFAULT 0,
                experiencia INTEGER NOT NULL DEFAULT 0,
                esAdmin INTEGER NOT NULL DEFAULT 0,
                fotoPerfil BLOB,
                contrasena TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS Actividades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                usuarioId TEXT NOT NULL,
                tipo TEXT NOT NULL,
                duracionMinutos INTEGER NOT NULL,
                distanciaKm REAL NOT NULL,
                fecha TEXT NOT NULL,
                hora TEXT NOT NULL,
                caloriasQuemadas INTEGER NOT NULL,
                esCompetencia INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_actividades_usuario_fecha
            ON Actividades(usuarioId, fecha)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS Logros (
                id TEXT PRIMARY KEY,
                nombre TEXT NOT NULL,
                descripcion TEXT NOT NULL,
                puntosRecompensa INTEGER NOT NULL,
                tipo TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS LogrosCompletados (
                usuarioId TEXT NOT NULL,
                logroId TEXT NOT NULL,
                fechaCumplimiento TEXT NOT NULL,
                PRIMARY KEY (usuarioId, logroId)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS Desafios (
                id TEXT PRIMARY KEY,
                nombre TEXT NOT NULL,
                descripcion TEXT NOT NULL,
                fechaInicio TEXT NOT NULL,
                fechaFin TEXT NOT NULL,
                puntosRecompensa INTEGER NOT NULL,
                estado TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS DesafiosCompletados (
                usuarioId TEXT NOT NULL,
                desafioId TEXT NOT NULL,
                fechaCumplimiento TEXT NOT NULL,
                PRIMARY KEY (usuarioId, desafioId)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS DesafiosParticipantes (
                desafioId TEXT NOT NULL,
                usuarioId TEXT NOT NULL,
                PRIMARY KEY (desafioId, usuarioId)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS Competencias (
                id TEXT PRIMARY KEY,
                nombre TEXT NOT NULL,
                tipoDeporte TEXT NOT NULL,
                fechaInicio TEXT,
                fechaFin TEXT,
                estado TEXT NOT NULL DEFAULT 'REGISTRO'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS CompetenciasParticipacion (
                competenciaId TEXT NOT NULL,
                usuarioId TEXT NOT NULL,
                fechaInicio TEXT,
                fechaFin TEXT,
                estado TEXT NOT NULL,
                PRIMARY KEY (competenciaId, usuarioId)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS CompetenciasPuntuaciones (
                competenciaId TEXT NOT NULL,
                usuarioId TEXT NOT NULL,
                puntuacion INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (competenciaId, usuarioId)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Whether a user with this id or display name already exists.
    pub async fn user_exists(&self, id: &str, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM Usuarios WHERE id = ? OR nombre = ?")
            .bind(id)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<i64, _>("total")? > 0)
    }

    /// Whether a user other than `except_id` already uses `name`.
    pub async fn name_taken(&self, name: &str, except_id: &str) -> Result<bool> {
        let row =
            sqlx::query("SELECT COUNT(*) AS total FROM Usuarios WHERE nombre = ? AND id <> ?")
                .bind(name)
                .bind(except_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(row.try_get::<i64, _>("total")? > 0)
    }

    pub async fn insert_user(&self, user: &User, password_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO Usuarios (id, nombre, nivel, puntosTotales, experiencia, esAdmin, fotoPerfil, contrasena)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.level)
        .bind(user.total_points)
        .bind(user.experience)
        .bind(user.is_admin)
        .bind(user.photo.as_deref())
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, nombre, nivel, puntosTotales, experiencia, esAdmin, fotoPerfil
            FROM Usuarios WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| user_from_row(&r)).transpose()
    }

    /// Stored password hash, if the user exists.
    pub async fn password_hash(&self, id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT contrasena FROM Usuarios WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_get("contrasena").map_err(GameError::from))
            .transpose()
    }

    /// Flush progression totals. Last write wins.
    pub async fn update_progress(&self, user: &User) -> Result<()> {
        sqlx::query(
            "UPDATE Usuarios SET puntosTotales = ?, experiencia = ?, nivel = ? WHERE id = ?",
        )
        .bind(user.total_points)
        .bind(user.experience)
        .bind(user.level)
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update the editable profile fields (display name and photo).
    pub async fn update_profile(&self, id: &str, name: &str, photo: Option<&[u8]>) -> Result<()> {
        sqlx::query("UPDATE Usuarios SET nombre = ?, fotoPerfil = ? WHERE id = ?")
            .bind(name)
            .bind(photo)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Activities
    // ========================================================================

    /// Insert an activity and return its assigned id.
    pub async fn insert_activity(&self, activity: &Activity) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO Actividades
                (usuarioId, tipo, duracionMinutos, distanciaKm, fecha, hora, caloriasQuemadas, esCompetencia)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&activity.user_id)
        .bind(activity.sport.as_db_str())
        .bind(activity.duration_minutes)
        .bind(activity.distance_km)
        .bind(activity.date)
        .bind(activity.time)
        .bind(activity.calories_burned)
        .bind(activity.is_competition)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All activities of a user, oldest first.
    pub async fn list_activities(&self, user_id: &str) -> Result<Vec<Activity>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM Actividades
            WHERE usuarioId = ?
            ORDER BY fecha ASC, hora ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(activity_from_row).collect()
    }

    pub async fn latest_activity(&self, user_id: &str) -> Result<Option<Activity>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM Actividades
            WHERE usuarioId = ?
            ORDER BY fecha DESC, hora DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(activity_from_row).transpose()
    }

    /// Distinct sports logged on or after `since`.
    pub async fn sports_since(&self, user_id: &str, since: NaiveDate) -> Result<Vec<SportType>> {
        let rows = sqlx::query(
            "SELECT DISTINCT tipo FROM Actividades WHERE usuarioId = ? AND fecha >= ? ORDER BY tipo",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let code: String = r.try_get("tipo")?;
                SportType::from_db_str(&code)
                    .ok_or_else(|| GameError::CorruptRecord(format!("unknown sport {code}")))
            })
            .collect()
    }

    /// Every date on which the user logged at least one activity.
    pub async fn active_dates(&self, user_id: &str) -> Result<BTreeSet<NaiveDate>> {
        let rows = sqlx::query("SELECT DISTINCT fecha FROM Actividades WHERE usuarioId = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| r.try_get::<NaiveDate, _>("fecha").map_err(GameError::from))
            .collect()
    }

    /// Sum of all logged minutes.
    pub async fn total_minutes(&self, user_id: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(duracionMinutos), 0) AS total FROM Actividades WHERE usuarioId = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("total")?)
    }

    // ========================================================================
    // Achievements
    // ========================================================================

    /// Insert an achievement definition unless one with the same id exists.
    pub async fn insert_achievement(&self, achievement: &Achievement) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO Logros (id, nombre, descripcion, puntosRecompensa, tipo)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&achievement.id)
        .bind(&achievement.name)
        .bind(&achievement.description)
        .bind(achievement.reward_points)
        .bind(achievement.category.as_db_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Achievements without a completion row for this user.
    pub async fn pending_achievements(&self, user_id: &str) -> Result<Vec<Achievement>> {
        let rows = sqlx::query(
            r#"
            SELECT l.*, 0 AS completado, NULL AS fechaCumplimiento
            FROM Logros l
            WHERE l.id NOT IN (SELECT logroId FROM LogrosCompletados WHERE usuarioId = ?)
            ORDER BY l.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| achievement_from_row(r, user_id))
            .collect()
    }

    /// Every achievement, with this user's completion state.
    pub async fn achievements_for_user(&self, user_id: &str) -> Result<Vec<Achievement>> {
        let rows = sqlx::query(
            r#"
            SELECT l.*,
                   CASE WHEN lc.usuarioId IS NOT NULL THEN 1 ELSE 0 END AS completado,
                   lc.fechaCumplimiento
            FROM Logros l
            LEFT JOIN LogrosCompletados lc ON l.id = lc.logroId AND lc.usuarioId = ?
            ORDER BY l.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| achievement_from_row(r, user_id))
            .collect()
    }

    /// Insert a completion row, or refresh its date if one exists.
    pub async fn upsert_achievement_completion(
        &self,
        user_id: &str,
        achievement_id: &str,
        date: NaiveDate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO LogrosCompletados (usuarioId, logroId, fechaCumplimiento)
            VALUES (?, ?, ?)
            ON CONFLICT (usuarioId, logroId)
            DO UPDATE SET fechaCumplimiento = excluded.fechaCumplimiento
            "#,
        )
        .bind(user_id)
        .bind(achievement_id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_achievement_completions(&self, user_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM LogrosCompletados WHERE usuarioId = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("total")?)
    }

    // ========================================================================
    // Challenges
    // ========================================================================

    pub async fn count_challenges(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM Desafios")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("total")?)
    }

    pub async fn insert_challenge(&self, challenge: &Challenge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO Desafios (id, nombre, descripcion, fechaInicio, fechaFin, puntosRecompensa, estado)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&challenge.id)
        .bind(&challenge.name)
        .bind(&challenge.description)
        .bind(challenge.start_date)
        .bind(challenge.end_date)
        .bind(challenge.reward_points)
        .bind(challenge.state.as_db_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Challenges without a completion row for this user.
    pub async fn pending_challenges(&self, user_id: &str) -> Result<Vec<Challenge>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM Desafios
            WHERE id NOT IN (SELECT desafioId FROM DesafiosCompletados WHERE usuarioId = ?)
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(challenge_from_row).collect()
    }

    /// Every challenge; the ones this user completed are reported `Completed`.
    pub async fn challenges_for_user(&self, user_id: &str) -> Result<Vec<Challenge>> {
        let rows = sqlx::query(
            r#"
            SELECT d.*,
                   CASE WHEN dc.usuarioId IS NOT NULL THEN 1 ELSE 0 END AS completado
            FROM Desafios d
            LEFT JOIN DesafiosCompletados dc ON d.id = dc.desafioId AND dc.usuarioId = ?
            ORDER BY d.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut challenges = rows
            .iter()
            .map(completed_challenge_from_row)
            .collect::<Result<Vec<_>>>()?;

        let enrolments = sqlx::query(
            "SELECT desafioId, usuarioId FROM DesafiosParticipantes ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in &enrolments {
            let challenge_id: String = row.try_get("desafioId")?;
            if let Some(challenge) = challenges.iter_mut().find(|c| c.id == challenge_id) {
                challenge.participants.push(row.try_get("usuarioId")?);
            }
        }

        Ok(challenges)
    }

    /// One challenge with its participants, `Completed` when this user
    /// already completed it.
    pub async fn challenge_for_user(
        &self,
        challenge_id: &str,
        user_id: &str,
    ) -> Result<Option<Challenge>> {
        let row = sqlx::query(
            r#"
            SELECT d.*,
                   CASE WHEN dc.usuarioId IS NOT NULL THEN 1 ELSE 0 END AS completado
            FROM Desafios d
            LEFT JOIN DesafiosCompletados dc ON d.id = dc.desafioId AND dc.usuarioId = ?
            WHERE d.id = ?
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut challenge = completed_challenge_from_row(&row)?;
        challenge.participants = self.challenge_participants(challenge_id).await?;

        Ok(Some(challenge))
    }

    pub async fn challenge_participants(&self, challenge_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT usuarioId FROM DesafiosParticipantes WHERE desafioId = ? ORDER BY rowid",
        )
        .bind(challenge_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get("usuarioId").map_err(GameError::from))
            .collect()
    }

    /// Enrol a user. Returns `false` when the user had already joined.
    pub async fn join_challenge(&self, challenge_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO DesafiosParticipantes (desafioId, usuarioId) VALUES (?, ?)",
        )
        .bind(challenge_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn upsert_challenge_completion(
        &self,
        user_id: &str,
        challenge_id: &str,
        date: NaiveDate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO DesafiosCompletados (usuarioId, desafioId, fechaCumplimiento)
            VALUES (?, ?, ?)
            ON CONFLICT (usuarioId, desafioId)
            DO UPDATE SET fechaCumplimiento = excluded.fechaCumplimiento
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_challenge_completions(&self, user_id: &str) -> Result<i64> {
        let row =
            sqlx::query("SELECT COUNT(*) AS total FROM DesafiosCompletados WHERE usuarioId = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(row.try_get("total")?)
    }

    // ========================================================================
    // Competitions
    // ========================================================================

    pub async fn count_competitions(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM Competencias")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("total")?)
    }

    pub async fn insert_competition(&self, competition: &Competition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO Competencias (id, nombre, tipoDeporte, fechaInicio, fechaFin, estado)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&competition.id)
        .bind(&competition.name)
        .bind(competition.sport.as_db_str())
        .bind(competition.start_date)
        .bind(competition.end_date)
        .bind(competition.state.as_db_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_competition(&self, id: &str) -> Result<Option<Competition>> {
        let row = sqlx::query(
            "SELECT id, nombre, tipoDeporte, fechaInicio, fechaFin, estado FROM Competencias WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(competition_from_row).transpose()
    }

    /// Write back a competition's dates and lifecycle state.
    pub async fn update_competition(&self, competition: &Competition) -> Result<()> {
        sqlx::query(
            "UPDATE Competencias SET fechaInicio = ?, fechaFin = ?, estado = ? WHERE id = ?",
        )
        .bind(competition.start_date)
        .bind(competition.end_date)
        .bind(competition.state.as_db_str())
        .bind(&competition.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every competition; `state` carries this user's participation state,
    /// `Registration` when the user has not joined.
    pub async fn competitions_for_user(&self, user_id: &str) -> Result<Vec<Competition>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.nombre, c.tipoDeporte,
                   cp.fechaInicio, cp.fechaFin,
                   COALESCE(cp.estado, 'REGISTRO') AS estado
            FROM Competencias c
            LEFT JOIN CompetenciasParticipacion cp
                ON c.id = cp.competenciaId AND cp.usuarioId = ?
            ORDER BY c.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(competition_from_row).collect()
    }

    pub async fn participation_state(
        &self,
        competition_id: &str,
        user_id: &str,
    ) -> Result<Option<CompetitionState>> {
        let row = sqlx::query(
            "SELECT estado FROM CompetenciasParticipacion WHERE competenciaId = ? AND usuarioId = ?",
        )
        .bind(competition_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let code: String = r.try_get("estado")?;
            CompetitionState::from_db_str(&code)
                .ok_or_else(|| GameError::CorruptRecord(format!("unknown participation state {code}")))
        })
        .transpose()
    }

    /// Open an in-progress participation with a zero score.
    ///
    /// Both rows are written in one transaction. An existing `REGISTRO`
    /// participation row is promoted; an existing score row is left as is.
    pub async fn insert_participation(
        &self,
        competition_id: &str,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<()> {
        let until = today
            .checked_add_days(Days::new(PARTICIPATION_DAYS))
            .unwrap_or(today);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO CompetenciasParticipacion (competenciaId, usuarioId, fechaInicio, fechaFin, estado)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (competenciaId, usuarioId)
            DO UPDATE SET estado = excluded.estado,
                          fechaInicio = excluded.fechaInicio,
                          fechaFin = excluded.fechaFin
            "#,
        )
        .bind(competition_id)
        .bind(user_id)
        .bind(today)
        .bind(until)
        .bind(CompetitionState::InProgress.as_db_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO CompetenciasPuntuaciones (competenciaId, usuarioId, puntuacion)
            VALUES (?, ?, 0)
            ON CONFLICT (competenciaId, usuarioId) DO NOTHING
            "#,
        )
        .bind(competition_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Add `points` to a score row. Returns the number of rows touched
    /// (0 when the user never registered).
    pub async fn add_score(&self, competition_id: &str, user_id: &str, points: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE CompetenciasPuntuaciones SET puntuacion = puntuacion + ?
            WHERE competenciaId = ? AND usuarioId = ?
            "#,
        )
        .bind(points)
        .bind(competition_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Score rows of a competition in store order (unsorted).
    pub async fn scores(&self, competition_id: &str) -> Result<Vec<RankingEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT s.usuarioId, COALESCE(u.nombre, s.usuarioId) AS nombre, s.puntuacion
            FROM CompetenciasPuntuaciones s
            LEFT JOIN Usuarios u ON s.usuarioId = u.id
            WHERE s.competenciaId = ?
            ORDER BY s.rowid
            "#,
        )
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(RankingEntry {
                    user_id: r.try_get("usuarioId")?,
                    name: r.try_get("nombre")?,
                    score: r.try_get("puntuacion")?,
                })
            })
            .collect()
    }

    /// Mark every participation of a competition as finished.
    pub async fn finish_participations(&self, competition_id: &str) -> Result<u64> {
        let result =
            sqlx::query("UPDATE CompetenciasParticipacion SET estado = ? WHERE competenciaId = ?")
                .bind(CompetitionState::Finished.as_db_str())
                .bind(competition_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// The competition for `sport` in which the user is currently competing.
    pub async fn active_competition_for(
        &self,
        user_id: &str,
        sport: SportType,
    ) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT cp.competenciaId
            FROM CompetenciasParticipacion cp
            JOIN Competencias c ON cp.competenciaId = c.id
            WHERE cp.usuarioId = ? AND cp.estado = ? AND c.tipoDeporte = ?
            ORDER BY cp.competenciaId
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(CompetitionState::InProgress.as_db_str())
        .bind(sport.as_db_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get("competenciaId").map_err(GameError::from))
            .transpose()
    }
}

#[cfg(test)]
impl Storage {
    /// Run a raw statement against the pool.
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("nombre")?,
        level: row.try_get("nivel")?,
        total_points: row.try_get("puntosTotales")?,
        experience: row.try_get("experiencia")?,
        is_admin: row.try_get("esAdmin")?,
        photo: row.try_get("fotoPerfil")?,
    })
}

fn activity_from_row(row: &SqliteRow) -> Result<Activity> {
    let code: String = row.try_get("tipo")?;
    let sport = SportType::from_db_str(&code)
        .ok_or_else(|| GameError::CorruptRecord(format!("unknown sport {code}")))?;

    Ok(Activity {
        id: Some(row.try_get("id")?),
        user_id: row.try_get("usuarioId")?,
        sport,
        duration_minutes: row.try_get("duracionMinutos")?,
        distance_km: row.try_get("distanciaKm")?,
        date: row.try_get("fecha")?,
        time: row.try_get("hora")?,
        calories_burned: row.try_get("caloriasQuemadas")?,
        is_competition: row.try_get("esCompetencia")?,
    })
}

fn achievement_from_row(row: &SqliteRow, user_id: &str) -> Result<Achievement> {
    let code: String = row.try_get("tipo")?;
    let category = AchievementCategory::from_db_str(&code)
        .ok_or_else(|| GameError::CorruptRecord(format!("unknown achievement type {code}")))?;

    let mut achievement = Achievement::new(
        row.try_get::<String, _>("id")?,
        row.try_get::<String, _>("nombre")?,
        row.try_get::<String, _>("descripcion")?,
        row.try_get("puntosRecompensa")?,
        category,
    );

    if row.try_get::<bool, _>("completado")? {
        achievement.completed = true;
        achievement.completed_on = row.try_get("fechaCumplimiento")?;
        achievement.completed_by = Some(user_id.to_string());
    }

    Ok(achievement)
}

fn challenge_from_row(row: &SqliteRow) -> Result<Challenge> {
    let code: String = row.try_get("estado")?;
    let state = ChallengeState::from_db_str(&code)
        .ok_or_else(|| GameError::CorruptRecord(format!("unknown challenge state {code}")))?;

    let mut challenge = Challenge::new(
        row.try_get::<String, _>("id")?,
        row.try_get::<String, _>("nombre")?,
        row.try_get::<String, _>("descripcion")?,
        row.try_get("puntosRecompensa")?,
        row.try_get("fechaInicio")?,
        row.try_get("fechaFin")?,
    );
    challenge.state = state;

    Ok(challenge)
}

fn completed_challenge_from_row(row: &SqliteRow) -> Result<Challenge> {
    let mut challenge = challenge_from_row(row)?;
    if row.try_get::<bool, _>("completado")? {
        challenge.state = ChallengeState::Completed;
    }
    Ok(challenge)
}

fn competition_from_row(row: &SqliteRow) -> Result<Competition> {
    let sport_code: String = row.try_get("tipoDeporte")?;
    let sport = SportType::from_db_str(&sport_code)
        .ok_or_else(|| GameError::CorruptRecord(format!("unknown sport {sport_code}")))?;
    let state_code: String = row.try_get("estado")?;
    let state = CompetitionState::from_db_str(&state_code)
        .ok_or_else(|| GameError::CorruptRecord(format!("unknown competition state {state_code}")))?;

    Ok(Competition {
        id: row.try_get("id")?,
        name: row.try_get("nombre")?,
        sport,
        start_date: row.try_get("fechaInicio")?,
        end_date: row.try_get("fechaFin")?,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn storage_with_user(id: &str) -> Storage {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        storage
            .insert_user(&User::new(id, format!("{id} name")), "hash")
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_user_roundtrip() {
        let storage = storage_with_user("ana").await;

        let user = storage.get_user("ana").await.unwrap().unwrap();
        assert_eq!(user.name, "ana name");
        assert_eq!(user.level, 1);
        assert!(!user.is_admin);

        assert!(storage.user_exists("ana", "other").await.unwrap());
        assert!(storage.user_exists("other", "ana name").await.unwrap());
        assert!(!storage.user_exists("ben", "ben name").await.unwrap());
        assert!(storage.name_taken("ana name", "ben").await.unwrap());
        assert!(!storage.name_taken("ana name", "ana").await.unwrap());

        assert_eq!(
            storage.password_hash("ana").await.unwrap().as_deref(),
            Some("hash")
        );
        assert!(storage.get_user("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_progress_and_profile() {
        let storage = storage_with_user("ana").await;

        let mut user = storage.get_user("ana").await.unwrap().unwrap();
        user.total_points = 1200;
        user.experience = 1200;
        user.level = 2;
        storage.update_progress(&user).await.unwrap();
        storage
            .update_profile("ana", "Ana María", Some(&[1u8, 2, 3][..]))
            .await
            .unwrap();

        let reloaded = storage.get_user("ana").await.unwrap().unwrap();
        assert_eq!(reloaded.total_points, 1200);
        assert_eq!(reloaded.level, 2);
        assert_eq!(reloaded.name, "Ana María");
        assert_eq!(reloaded.photo, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_activity_queries() {
        let storage = storage_with_user("ana").await;

        let first = Activity::new("ana", SportType::Run, 30, 5.0, false, at("2026-03-01", "08:00:00"));
        let second = Activity::new("ana", SportType::Swim, 20, 1.0, false, at("2026-03-03", "18:15:00"));
        let id = storage.insert_activity(&first).await.unwrap();
        storage.insert_activity(&second).await.unwrap();
        assert!(id > 0);

        let activities = storage.list_activities("ana").await.unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].calories_burned, 550);
        assert_eq!(activities[0].time, first.time);

        let latest = storage.latest_activity("ana").await.unwrap().unwrap();
        assert_eq!(latest.sport, SportType::Swim);

        let sports = storage.sports_since("ana", date("2026-03-02")).await.unwrap();
        assert_eq!(sports, vec![SportType::Swim]);

        let dates = storage.active_dates("ana").await.unwrap();
        assert_eq!(dates.len(), 2);
        assert_eq!(storage.total_minutes("ana").await.unwrap(), 50);
        assert_eq!(storage.total_minutes("ben").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_achievement_completion_upsert() {
        let storage = storage_with_user("ana").await;
        let achievement = Achievement::new("1", "First", "desc", 50, AchievementCategory::Daily);
        storage.insert_achievement(&achievement).await.unwrap();
        // Insert-or-ignore keeps the table at one row
        storage.insert_achievement(&achievement).await.unwrap();

        assert_eq!(storage.pending_achievements("ana").await.unwrap().len(), 1);

        storage
            .upsert_achievement_completion("ana", "1", date("2026-03-01"))
            .await
            .unwrap();
        storage
            .upsert_achievement_completion("ana", "1", date("2026-03-05"))
            .await
            .unwrap();

        assert_eq!(storage.count_achievement_completions("ana").await.unwrap(), 1);
        assert!(storage.pending_achievements("ana").await.unwrap().is_empty());

        let all = storage.achievements_for_user("ana").await.unwrap();
        assert!(all[0].completed);
        assert_eq!(all[0].completed_on, Some(date("2026-03-05")));

        // Other users are unaffected
        let other = storage.achievements_for_user("ben").await.unwrap();
        assert!(!other[0].completed);
    }

    #[tokio::test]
    async fn test_participation_lifecycle() {
        let storage = storage_with_user("ana").await;
        let competition = Competition::new("C001", "Marathon", SportType::Run);
        storage.insert_competition(&competition).await.unwrap();

        assert!(storage.participation_state("C001", "ana").await.unwrap().is_none());

        storage
            .insert_participation("C001", "ana", date("2026-03-01"))
            .await
            .unwrap();
        assert_eq!(
            storage.participation_state("C001", "ana").await.unwrap(),
            Some(CompetitionState::InProgress)
        );
        assert_eq!(
            storage.active_competition_for("ana", SportType::Run).await.unwrap(),
            Some("C001".to_string())
        );
        assert!(storage
            .active_competition_for("ana", SportType::Swim)
            .await
            .unwrap()
            .is_none());

        assert_eq!(storage.add_score("C001", "ana", 80).await.unwrap(), 1);
        assert_eq!(storage.add_score("C001", "ghost", 80).await.unwrap(), 0);

        let scores = storage.scores("C001").await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 80);
        assert_eq!(scores[0].name, "ana name");

        assert_eq!(storage.finish_participations("C001").await.unwrap(), 1);
        assert_eq!(
            storage.participation_state("C001", "ana").await.unwrap(),
            Some(CompetitionState::Finished)
        );

        let listed = storage.competitions_for_user("ana").await.unwrap();
        assert_eq!(listed[0].state, CompetitionState::Finished);
        let listed = storage.competitions_for_user("ben").await.unwrap();
        assert_eq!(listed[0].state, CompetitionState::Registration);
    }

    #[tokio::test]
    async fn test_registration_promotes_pending_participation() {
        let storage = storage_with_user("ana").await;
        storage
            .insert_competition(&Competition::new("C001", "Marathon", SportType::Run))
            .await
            .unwrap();

        // A participation left in REGISTRO with points already on the board
        sqlx::query(
            "INSERT INTO CompetenciasParticipacion (competenciaId, usuarioId, estado) VALUES ('C001', 'ana', 'REGISTRO')",
        )
        .execute(&storage.pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO CompetenciasPuntuaciones (competenciaId, usuarioId, puntuacion) VALUES ('C001', 'ana', 40)",
        )
        .execute(&storage.pool)
        .await
        .unwrap();
        assert_eq!(
            storage.participation_state("C001", "ana").await.unwrap(),
            Some(CompetitionState::Registration)
        );

        storage
            .insert_participation("C001", "ana", date("2026-03-01"))
            .await
            .unwrap();

        assert_eq!(
            storage.participation_state("C001", "ana").await.unwrap(),
            Some(CompetitionState::InProgress)
        );
        let listed = storage.competitions_for_user("ana").await.unwrap();
        assert_eq!(listed[0].start_date, Some(date("2026-03-01")));
        assert_eq!(listed[0].end_date, Some(date("2026-03-11")));

        let scores = storage.scores("C001").await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 40);
    }

    #[tokio::test]
    async fn test_challenge_enrolment() {
        let storage = storage_with_user("ana").await;
        let challenge = Challenge::new(
            "D001",
            "Distance",
            "desc",
            200,
            date("2026-03-01"),
            date("2026-03-08"),
        );
        storage.insert_challenge(&challenge).await.unwrap();

        assert!(storage.challenge_for_user("D404", "ana").await.unwrap().is_none());

        assert!(storage.join_challenge("D001", "ana").await.unwrap());
        assert!(!storage.join_challenge("D001", "ana").await.unwrap());
        assert!(storage.join_challenge("D001", "ben").await.unwrap());
        assert_eq!(
            storage.challenge_participants("D001").await.unwrap(),
            vec!["ana", "ben"]
        );

        let loaded = storage.challenge_for_user("D001", "ana").await.unwrap().unwrap();
        assert_eq!(loaded.participants, vec!["ana", "ben"]);
        assert_eq!(loaded.state, ChallengeState::Pending);

        storage
            .upsert_challenge_completion("ana", "D001", date("2026-03-02"))
            .await
            .unwrap();
        let loaded = storage.challenge_for_user("D001", "ana").await.unwrap().unwrap();
        assert_eq!(loaded.state, ChallengeState::Completed);
        let loaded = storage.challenge_for_user("D001", "ben").await.unwrap().unwrap();
        assert_eq!(loaded.state, ChallengeState::Pending);

        let all = storage.challenges_for_user("ana").await.unwrap();
        assert_eq!(all[0].participants.len(), 2);
    }

    #[tokio::test]
    async fn test_update_competition() {
        let storage = storage_with_user("ana").await;
        let mut competition = Competition::new("C001", "Marathon", SportType::Run);
        storage.insert_competition(&competition).await.unwrap();

        competition.start_date = Some(date("2026-03-01"));
        competition.end_date = Some(date("2026-03-20"));
        competition.state = CompetitionState::InProgress;
        storage.update_competition(&competition).await.unwrap();

        assert_eq!(storage.get_competition("C001").await.unwrap(), Some(competition));
    }
}
