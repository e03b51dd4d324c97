//! Database schema creation and demo seed data

use crate::db::Pool;
use crate::error::Result;

const DDL: &str = "
CREATE TABLE IF NOT EXISTS classes (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    teacher_id INT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('teacher', 'parent')),
    full_name TEXT NOT NULL,
    telephone_number TEXT UNIQUE,
    class_id INT REFERENCES classes(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS children (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    class_id INT NOT NULL REFERENCES classes(id),
    student_no TEXT UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS photos (
    id SERIAL PRIMARY KEY,
    path TEXT NOT NULL,
    uploader_id INT NOT NULL REFERENCES users(id),
    class_id INT NOT NULL REFERENCES classes(id),
    is_public BOOLEAN NOT NULL DEFAULT true,
    recognition JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS parent_child (
    parent_id INT NOT NULL REFERENCES users(id),
    child_id INT NOT NULL REFERENCES children(id),
    PRIMARY KEY (parent_id, child_id)
);

CREATE TABLE IF NOT EXISTS likes (
    user_id INT NOT NULL REFERENCES users(id),
    photo_id INT NOT NULL REFERENCES photos(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (user_id, photo_id)
);
";

/// Create all tables if they do not exist
pub async fn init_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client.batch_execute(DDL).await?;
    tracing::info!("schema ready");
    Ok(())
}

/// Insert demo rows on a fresh database: one teacher, one parent, three
/// classes, three children and one binding. Skipped when classes exist.
pub async fn seed_demo_data(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;

    let row = client.query_one("SELECT COUNT(*) FROM classes", &[]).await?;
    let count: i64 = row.get(0);
    if count > 0 {
        tracing::info!("database already seeded, skipping");
        return Ok(());
    }

    client
        .execute(
            "INSERT INTO classes (name) VALUES ('大班A'), ('中班B'), ('小班C')",
            &[],
        )
        .await?;

    let password = bcrypt::hash("123456", bcrypt::DEFAULT_COST)?;
    client
        .execute(
            "INSERT INTO users (username, password, role, full_name, class_id) VALUES \
             ($1, $2, 'teacher', '张老师', 1), \
             ($3, $2, 'parent', '李家长', NULL)",
            &[&"teacher1", &password, &"parent1"],
        )
        .await?;

    client
        .execute(
            "INSERT INTO children (name, class_id, student_no) VALUES \
             ('小明', 1, 'S001'), ('小红', 1, 'S002'), ('小刚', 2, 'S003')",
            &[],
        )
        .await?;

    client
        .execute(
            "INSERT INTO parent_child (parent_id, child_id) \
             SELECT u.id, c.id FROM users u, children c \
             WHERE u.username = 'parent1' AND c.student_no = 'S001'",
            &[],
        )
        .await?;

    tracing::info!("demo data inserted");
    Ok(())
}
