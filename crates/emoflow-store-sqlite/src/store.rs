//! [`SqliteStore`]: the SQLite implementation of [`NoteStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use emoflow_core::{
  Owner,
  flow::{Flow, Middle, NewFlow, NewMiddle},
  note::{
    Alternative, Behavior, CognitiveError, NewBehavior, NewCognitiveError,
    NewNote, NewThought, Note, NoteDetails, NoteListing, Thought,
  },
  store::{NoteQuery, NoteStore},
};

use crate::{
  Error, Result,
  encode::{
    RawDetails, RawFlow, RawMiddle, RawNote, decode_alternative, decode_behavior,
    decode_cognitive_error, decode_thought, encode_dt, encode_owner,
  },
  schema::SCHEMA,
};

/// Ownership predicate over a table's `user_id` / `device_id` columns. `IS`
/// rather than `=` so the unset column matches `NULL`.
macro_rules! owned_by {
  ($alias:literal, $user:literal, $device:literal) => {
    concat!(
      $alias, ".user_id IS ", $user, " AND ", $alias, ".device_id IS ", $device
    )
  };
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An emoflow note graph backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_notes(&self, owner: &Owner, ids: Vec<i64>) -> Result<Vec<Note>> {
    let (user_id, device_id) = encode_owner(owner);
    let mut ids = ids;
    ids.sort_unstable();
    ids.dedup();

    let raws: Vec<RawNote> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM notes n WHERE n.id = ?1 AND {}",
          RawNote::COLUMNS,
          owned_by!("n", "?2", "?3"),
        ))?;
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
          if let Some(raw) = stmt
            .query_row(rusqlite::params![id, user_id, device_id], RawNote::from_row)
            .optional()?
          {
            rows.push(raw);
          }
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNote::into_note).collect()
  }

  async fn load_details(&self, note_ids: Vec<i64>) -> Result<RawDetails> {
    let raw = self
      .conn
      .call(move |conn| {
        let mut out = RawDetails::default();
        let mut thoughts = conn.prepare(
          "SELECT id, note_id, emotion, automatic_thought, created_at
           FROM thoughts WHERE note_id = ?1 ORDER BY created_at, id",
        )?;
        let mut errors = conn.prepare(
          "SELECT id, note_id, label, description, created_at
           FROM cognitive_errors WHERE note_id = ?1 ORDER BY created_at, id",
        )?;
        let mut alternatives = conn.prepare(
          "SELECT id, note_id, alternative, created_at
           FROM alternatives WHERE note_id = ?1 ORDER BY created_at, id",
        )?;
        let mut behaviors = conn.prepare(
          "SELECT id, note_id, label, description, created_at
           FROM behaviors WHERE note_id = ?1 ORDER BY created_at, id",
        )?;

        for id in note_ids {
          out.thoughts.extend(
            thoughts
              .query_map([id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
              .collect::<rusqlite::Result<Vec<_>>>()?,
          );
          out.errors.extend(
            errors
              .query_map([id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
              .collect::<rusqlite::Result<Vec<_>>>()?,
          );
          out.alternatives.extend(
            alternatives
              .query_map([id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
              .collect::<rusqlite::Result<Vec<_>>>()?,
          );
          out.behaviors.extend(
            behaviors
              .query_map([id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
              .collect::<rusqlite::Result<Vec<_>>>()?,
          );
        }
        Ok(out)
      })
      .await?;
    Ok(raw)
  }
}

fn slot(details: &[NoteDetails], note_id: i64) -> Option<usize> {
  details.binary_search_by_key(&note_id, |d| d.note.id).ok()
}

// ─── NoteStore impl ──────────────────────────────────────────────────────────

impl NoteStore for SqliteStore {
  type Error = Error;

  // ── Notes ─────────────────────────────────────────────────────────────────

  async fn insert_note(
    &self,
    owner: Owner,
    input: NewNote,
    flow_id: Option<i64>,
  ) -> Result<Note> {
    let created_at = Utc::now();
    let at_str = encode_dt(created_at);
    let (user_id, device_id) = encode_owner(&owner);
    let NewNote { title, trigger_text } = input;
    let (title_c, trigger_c) = (title.clone(), trigger_text.clone());

    // `None` when the flow to join is not the caller's; nothing is committed.
    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO notes (user_id, device_id, title, trigger_text, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![user_id, device_id, title_c, trigger_c, at_str],
        )?;
        let id = tx.last_insert_rowid();

        if let Some(flow_id) = flow_id {
          let joined = tx.execute(
            concat!(
              "INSERT OR IGNORE INTO flow_notes (flow_id, note_id, created_at)
               SELECT f.id, ?2, ?3 FROM flows f WHERE f.id = ?1 AND ",
              owned_by!("f", "?4", "?5"),
            ),
            rusqlite::params![flow_id, id, at_str, user_id, device_id],
          )?;
          if joined == 0 {
            return Ok(None);
          }
        }

        tx.commit()?;
        Ok(Some(id))
      })
      .await?;

    let id = id.ok_or(Error::NotOwned {
      resource: "flow",
      id:       flow_id.unwrap_or_default(),
    })?;

    Ok(Note { id, owner, title, trigger_text, created_at })
  }

  async fn get_notes(&self, owner: Owner, ids: Vec<i64>) -> Result<Vec<Note>> {
    self.load_notes(&owner, ids).await
  }

  async fn get_note_details(&self, owner: Owner, ids: Vec<i64>) -> Result<Vec<NoteDetails>> {
    let notes = self.load_notes(&owner, ids).await?;
    if notes.is_empty() {
      return Ok(Vec::new());
    }
    let raw = self.load_details(notes.iter().map(|n| n.id).collect()).await?;

    // Ordered by id, so children are routed by binary search.
    let mut details: Vec<NoteDetails> = notes.into_iter().map(NoteDetails::bare).collect();
    for row in raw.thoughts {
      let thought = decode_thought(row)?;
      if let Some(i) = slot(&details, thought.note_id) {
        details[i].thoughts.push(thought);
      }
    }
    for row in raw.errors {
      let error = decode_cognitive_error(row)?;
      if let Some(i) = slot(&details, error.note_id) {
        details[i].errors.push(error);
      }
    }
    for row in raw.alternatives {
      let alternative = decode_alternative(row)?;
      if let Some(i) = slot(&details, alternative.note_id) {
        details[i].alternatives.push(alternative);
      }
    }
    for row in raw.behaviors {
      let behavior = decode_behavior(row)?;
      if let Some(i) = slot(&details, behavior.note_id) {
        details[i].behaviors.push(behavior);
      }
    }
    Ok(details)
  }

  async fn search_notes(&self, owner: Owner, query: NoteQuery) -> Result<Vec<NoteListing>> {
    let (user_id, device_id) = encode_owner(&owner);
    let text_pattern = query
      .text
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .map(|t| format!("%{t}%"));
    let after_str = query.created_after.map(encode_dt);
    let before_str = query.created_before.map(encode_dt);
    let exclude = query.exclude_flow_id;
    // A negative LIMIT means "no limit" to SQLite.
    let limit_val = query.limit.map_or(-1, |l| l as i64);

    let (raws, memberships): (Vec<RawNote>, Vec<Vec<i64>>) = self
      .conn
      .call(move |conn| {
        // Build WHERE clause dynamically.
        let mut conds: Vec<&'static str> = vec![owned_by!("n", "?1", "?2")];
        if text_pattern.is_some() {
          conds.push("(n.title LIKE ?3 OR n.trigger_text LIKE ?3)");
        }
        if after_str.is_some() {
          conds.push("n.created_at >= ?4");
        }
        if before_str.is_some() {
          conds.push("n.created_at < ?5");
        }
        if exclude.is_some() {
          conds.push(
            "NOT EXISTS (SELECT 1 FROM flow_notes m WHERE m.note_id = n.id AND m.flow_id = ?6)",
          );
        }

        let sql = format!(
          "SELECT {} FROM notes n
           WHERE {}
           ORDER BY n.created_at DESC, n.id DESC
           LIMIT ?7",
          RawNote::COLUMNS,
          conds.join(" AND "),
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              user_id,
              device_id,
              text_pattern.as_deref(),
              after_str.as_deref(),
              before_str.as_deref(),
              exclude,
              limit_val,
            ],
            RawNote::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut flows = conn.prepare(
          "SELECT flow_id FROM flow_notes WHERE note_id = ?1 ORDER BY flow_id",
        )?;
        let memberships = rows
          .iter()
          .map(|raw| {
            flows
              .query_map([raw.id], |r| r.get(0))?
              .collect::<rusqlite::Result<Vec<i64>>>()
          })
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((rows, memberships))
      })
      .await?;

    raws
      .into_iter()
      .zip(memberships)
      .map(|(raw, flow_ids)| Ok(NoteListing { note: raw.into_note()?, flow_ids }))
      .collect()
  }

  // ── Detail rows ───────────────────────────────────────────────────────────

  async fn insert_thought(&self, note_id: i64, input: NewThought) -> Result<Thought> {
    let created_at = Utc::now();
    let at_str = encode_dt(created_at);
    let (emotion, automatic_thought) = (input.emotion.clone(), input.automatic_thought.clone());

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO thoughts (note_id, emotion, automatic_thought, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![note_id, emotion, automatic_thought, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Thought {
      id,
      note_id,
      emotion: input.emotion,
      automatic_thought: input.automatic_thought,
      created_at,
    })
  }

  async fn insert_alternative(&self, note_id: i64, alternative: String) -> Result<Alternative> {
    let created_at = Utc::now();
    let at_str = encode_dt(created_at);
    let text = alternative.clone();

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO alternatives (note_id, alternative, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![note_id, text, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Alternative { id, note_id, alternative, created_at })
  }

  async fn insert_cognitive_error(
    &self,
    note_id: i64,
    input: NewCognitiveError,
  ) -> Result<CognitiveError> {
    let created_at = Utc::now();
    let at_str = encode_dt(created_at);
    let (label, description) = (input.label.clone(), input.description.clone());

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cognitive_errors (note_id, label, description, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![note_id, label, description, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(CognitiveError {
      id,
      note_id,
      label: input.label,
      description: input.description,
      created_at,
    })
  }

  async fn insert_behavior(&self, note_id: i64, input: NewBehavior) -> Result<Behavior> {
    let created_at = Utc::now();
    let at_str = encode_dt(created_at);
    let (label, description) = (input.label.clone(), input.description.clone());

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO behaviors (note_id, label, description, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![note_id, label, description, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Behavior {
      id,
      note_id,
      label: input.label,
      description: input.description,
      created_at,
    })
  }

  // ── Flows ─────────────────────────────────────────────────────────────────

  async fn create_flow(&self, owner: Owner, input: NewFlow) -> Result<Flow> {
    let created_at = Utc::now();
    let at_str = encode_dt(created_at);
    let (user_id, device_id) = encode_owner(&owner);
    let (title, description) = (input.title.clone(), input.description.clone());

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO flows (user_id, device_id, title, description, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![user_id, device_id, title, description, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Flow {
      id,
      owner,
      title: input.title,
      description: input.description,
      created_at,
    })
  }

  async fn get_flow(&self, owner: Owner, flow_id: i64) -> Result<Option<Flow>> {
    let (user_id, device_id) = encode_owner(&owner);

    let raw: Option<RawFlow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              concat!(
                "SELECT f.id, f.user_id, f.device_id, f.title, f.description, f.created_at
                 FROM flows f WHERE f.id = ?1 AND ",
                owned_by!("f", "?2", "?3"),
              ),
              rusqlite::params![flow_id, user_id, device_id],
              |row| {
                Ok(RawFlow {
                  id:          row.get(0)?,
                  user_id:     row.get(1)?,
                  device_id:   row.get(2)?,
                  title:       row.get(3)?,
                  description: row.get(4)?,
                  created_at:  row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFlow::into_flow).transpose()
  }

  async fn attach_notes(
    &self,
    owner: Owner,
    flow_id: i64,
    note_ids: Vec<i64>,
  ) -> Result<Vec<i64>> {
    let at_str = encode_dt(Utc::now());
    let (user_id, device_id) = encode_owner(&owner);
    let requested = note_ids.len();

    let attached: Vec<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let flow_owned = tx
          .query_row(
            concat!("SELECT 1 FROM flows f WHERE f.id = ?1 AND ", owned_by!("f", "?2", "?3")),
            rusqlite::params![flow_id, user_id, device_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !flow_owned {
          return Ok(Vec::new());
        }

        let mut attached: Vec<i64> = Vec::new();
        {
          let mut insert = tx.prepare(concat!(
            "INSERT OR IGNORE INTO flow_notes (flow_id, note_id, created_at)
             SELECT ?1, n.id, ?2 FROM notes n WHERE n.id = ?3 AND ",
            owned_by!("n", "?4", "?5"),
          ))?;
          let mut member = tx.prepare(concat!(
            "SELECT 1 FROM flow_notes m JOIN notes n ON n.id = m.note_id
             WHERE m.flow_id = ?1 AND m.note_id = ?2 AND ",
            owned_by!("n", "?3", "?4"),
          ))?;
          for note_id in note_ids {
            if attached.contains(&note_id) {
              continue;
            }
            insert.execute(rusqlite::params![flow_id, at_str, note_id, user_id, device_id])?;
            // An owned note that was already a member counts as attached.
            let owned_member = member
              .query_row(rusqlite::params![flow_id, note_id, user_id, device_id], |_| Ok(()))
              .optional()?
              .is_some();
            if owned_member {
              attached.push(note_id);
            }
          }
        }
        tx.commit()?;
        Ok(attached)
      })
      .await?;

    if attached.len() < requested {
      tracing::debug!(flow_id, requested, attached = attached.len(), "attach skipped notes");
    }
    Ok(attached)
  }

  async fn flow_note_ids(&self, owner: Owner, flow_id: i64) -> Result<Vec<i64>> {
    let (user_id, device_id) = encode_owner(&owner);

    let ids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(concat!(
          "SELECT m.note_id FROM flow_notes m
           JOIN flows f ON f.id = m.flow_id
           WHERE m.flow_id = ?1 AND ",
          owned_by!("f", "?2", "?3"),
          " ORDER BY m.note_id",
        ))?;
        let ids = stmt
          .query_map(rusqlite::params![flow_id, user_id, device_id], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }

  // ── Middles (append-only) ────────────────────────────────────────────────

  async fn insert_middle(&self, owner: Owner, input: NewMiddle) -> Result<Middle> {
    let created_at = Utc::now();
    let at_str = encode_dt(created_at);
    let (user_id, device_id) = encode_owner(&owner);
    let NewMiddle { from_note_id, to_note_id, flow_id } = input;

    // The inner `Err` is the first ownership or membership check that failed.
    let inserted: Result<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let checks = [("note", from_note_id), ("note", to_note_id), ("flow", flow_id)];
        for (resource, id) in checks {
          let sql = if resource == "note" {
            concat!("SELECT 1 FROM notes n WHERE n.id = ?1 AND ", owned_by!("n", "?2", "?3"))
          } else {
            concat!("SELECT 1 FROM flows f WHERE f.id = ?1 AND ", owned_by!("f", "?2", "?3"))
          };
          let owned = tx
            .query_row(sql, rusqlite::params![id, user_id, device_id], |_| Ok(()))
            .optional()?
            .is_some();
          if !owned {
            return Ok(Err(Error::NotOwned { resource, id }));
          }
        }

        for note_id in [from_note_id, to_note_id] {
          let member = tx
            .query_row(
              "SELECT 1 FROM flow_notes WHERE flow_id = ?1 AND note_id = ?2",
              rusqlite::params![flow_id, note_id],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if !member {
            return Ok(Err(Error::NotMember { note_id, flow_id }));
          }
        }

        tx.execute(
          "INSERT INTO middles (user_id, device_id, from_note_id, to_note_id, flow_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![user_id, device_id, from_note_id, to_note_id, flow_id, at_str],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Ok(id))
      })
      .await?;

    let id = inserted?;
    Ok(Middle { id, owner, from_note_id, to_note_id, flow_id, created_at })
  }

  async fn list_middles(&self, owner: Owner, flow_id: i64) -> Result<Vec<Middle>> {
    let (user_id, device_id) = encode_owner(&owner);

    let raws: Vec<RawMiddle> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(concat!(
          "SELECT m.id, m.user_id, m.device_id, m.from_note_id, m.to_note_id, m.flow_id, m.created_at
           FROM middles m
           WHERE m.flow_id = ?1 AND ",
          owned_by!("m", "?2", "?3"),
          " ORDER BY m.created_at, m.id",
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![flow_id, user_id, device_id], RawMiddle::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMiddle::into_middle).collect()
  }
}
