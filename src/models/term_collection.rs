use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;

/// Academic season of a term. Maps to the `season` enum type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "season")]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Fall];

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
            Season::Winter => "Winter",
        }
    }

    /// Season whose token (`winter`, `spring`, `summer`, `fall`) appears earliest in free text.
    pub fn from_description(description: &str) -> Option<Season> {
        let lowered = description.to_lowercase();
        Season::ALL
            .into_iter()
            .filter_map(|season| {
                lowered
                    .find(&season.as_str().to_lowercase())
                    .map(|position| (position, season))
            })
            .min_by_key(|(position, _)| *position)
            .map(|(_, season)| season)
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar term value object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    pub year: i32,
    pub season: Season,
}

/// Upstream handle for one school's term (e.g. "202440").
/// Maps to `term_collections` table, unique on `(school_id, id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TermCollection {
    pub id: String,
    pub school_id: String,
    pub year: i32,
    pub season: Season,
    pub name: Option<String>,
    /// false once the upstream has frozen the term
    pub still_collecting: bool,
}

impl TermCollection {
    pub fn term(&self) -> Term {
        Term {
            year: self.year,
            season: self.season,
        }
    }

    pub async fn upsert(pool: &PgPool, term: &TermCollection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO term_collections (id, school_id, year, season, name, still_collecting)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (school_id, id) DO UPDATE
            SET year = EXCLUDED.year,
                season = EXCLUDED.season,
                name = EXCLUDED.name,
                still_collecting = EXCLUDED.still_collecting
            "#,
        )
        .bind(&term.id)
        .bind(&term.school_id)
        .bind(term.year)
        .bind(term.season)
        .bind(&term.name)
        .bind(term.still_collecting)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn find(
        pool: &PgPool,
        school_id: &str,
        id: &str,
    ) -> Result<Option<TermCollection>, sqlx::Error> {
        sqlx::query_as::<_, TermCollection>(
            r#"
            SELECT id, school_id, year, season, name, still_collecting
            FROM term_collections
            WHERE school_id = $1 AND id = $2
            "#,
        )
        .bind(school_id)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Look a term collection up by id alone; ids are only unique per school,
    /// so the first match in school order wins.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<TermCollection>, sqlx::Error> {
        sqlx::query_as::<_, TermCollection>(
            r#"
            SELECT id, school_id, year, season, name, still_collecting
            FROM term_collections
            WHERE id = $1
            ORDER BY school_id
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_school(
        pool: &PgPool,
        school_id: &str,
    ) -> Result<Vec<TermCollection>, sqlx::Error> {
        sqlx::query_as::<_, TermCollection>(
            r#"
            SELECT id, school_id, year, season, name, still_collecting
            FROM term_collections
            WHERE school_id = $1
            ORDER BY id
            "#,
        )
        .bind(school_id)
        .fetch_all(pool)
        .await
    }

    /// Terms the scheduler may enqueue
    pub async fn list_still_collecting(pool: &PgPool) -> Result<Vec<TermCollection>, sqlx::Error> {
        sqlx::query_as::<_, TermCollection>(
            r#"
            SELECT id, school_id, year, season, name, still_collecting
            FROM term_collections
            WHERE still_collecting
            ORDER BY school_id, id
            "#,
        )
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_from_description() {
        assert_eq!(Season::from_description("Fall 2024"), Some(Season::Fall));
        assert_eq!(Season::from_description("SPRING 2025 (View Only)"), Some(Season::Spring));
        assert_eq!(Season::from_description("Summer Session I"), Some(Season::Summer));
        assert_eq!(Season::from_description("Winter Intersession"), Some(Season::Winter));
        assert_eq!(Season::from_description("Intersession 2024"), None);
    }

    #[test]
    fn test_combined_terms_take_the_leading_season() {
        assert_eq!(Season::from_description("Summer/Fall 2024"), Some(Season::Summer));
        assert_eq!(Season::from_description("Fall-Winter Session 2024"), Some(Season::Fall));
        assert_eq!(Season::from_description("2025 Spring & Winter"), Some(Season::Spring));
    }
}
