use dbkit::ValidationError;
use dbkit::prelude::*;

#[derive(Record, Debug, Default)]
#[record(table = "authors", alias = "a", validate = "check_author")]
struct Author {
    id: Option<i64>,
    name: String,
    status: Option<String>,
}

fn check_author(author: &Author) -> std::result::Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    if author.name.trim().is_empty() {
        errors.add_custom("name", "must not be blank");
    }
    errors.into_result()
}

#[derive(Record, Debug, Default)]
#[record(table = "posts", validate = "check_post")]
struct Post {
    id: Option<i64>,
    title: String,
    author_id: Option<i64>,

    #[record(relation(defaults(status = "active")))]
    author: Related<Author>,

    comments: RelatedMany<Comment>,

    #[record(relation(kind = "has_many_to_many", link_table = "post_tags"))]
    tags: RelatedMany<Tag>,
}

fn check_post(post: &Post) -> std::result::Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    if post.title.is_empty() {
        errors.add_custom("title", "must not be empty");
    }
    errors.into_result()
}

#[derive(Record, Debug, Default)]
#[record(table = "comments")]
struct Comment {
    id: Option<i64>,
    post_id: Option<i64>,
    body: String,
    author_id: Option<i64>,

    #[record(relation(defaults(status = "reviewer")))]
    author: Related<Author>,
}

#[derive(Record, Debug, Default)]
#[record(table = "tags")]
struct Tag {
    id: Option<i64>,
    name: String,
}

fn service() -> DbService<SqliteConnection> {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    conn.execute_raw(
        "CREATE TABLE authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            status TEXT
        );
        CREATE TABLE posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            author_id INTEGER REFERENCES authors(id)
        );
        CREATE TABLE comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER REFERENCES posts(id),
            body TEXT NOT NULL,
            author_id INTEGER REFERENCES authors(id)
        );
        CREATE TABLE tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        );
        CREATE TABLE post_tags (
            post_id INTEGER NOT NULL REFERENCES posts(id),
            tag_id INTEGER NOT NULL REFERENCES tags(id)
        );",
    )
    .expect("create schema");
    DbService::new(conn)
}

fn author(name: &str) -> Author {
    Author {
        name: name.to_string(),
        ..Author::default()
    }
}

fn comment(body: &str) -> Comment {
    Comment {
        body: body.to_string(),
        ..Comment::default()
    }
}

fn tag(name: &str) -> Tag {
    Tag {
        name: name.to_string(),
        ..Tag::default()
    }
}

fn count(db: &DbService<SqliteConnection>, table: &str) -> Value {
    db.query_value(&format!("SELECT COUNT(*) FROM {}", table))
        .expect("count rows")
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn saved_post(db: &DbService<SqliteConnection>) -> Post {
    let mut post = Post {
        title: "Hello".to_string(),
        ..Post::default()
    };
    post.author.set(author("Ada"));
    post.comments.push(comment("first"));
    post.comments.push(comment("second"));
    post.tags.push(tag("rust"));
    post.save(db).expect("save post");
    post
}

#[test]
fn sqlite_save_cascades_through_relations() {
    let db = service();
    let post = saved_post(&db);

    let post_id = post.id.expect("post id assigned");
    let saved_author = post.author.get().expect("author still attached");
    let author_id = saved_author.id.expect("author id assigned");
    assert_eq!(post.author_id, Some(author_id));
    assert_eq!(saved_author.status.as_deref(), Some("active"));

    for comment in &post.comments {
        assert!(comment.id.is_some());
        assert_eq!(comment.post_id, Some(post_id));
    }

    assert_eq!(
        db.query_value("SELECT status FROM authors").unwrap(),
        text("active")
    );
    assert_eq!(count(&db, "comments"), Value::Int(2));
    assert_eq!(count(&db, "post_tags"), Value::Int(1));
    assert!(!db.connection().in_transaction());
}

#[test]
fn sqlite_nested_save_forces_relation_defaults() {
    let db = service();
    let mut reviewer = author("Bea");
    reviewer.status = Some("inactive".to_string());
    let mut reply = comment("nested");
    reply.author.set(reviewer);

    let mut post = Post {
        title: "Hello".to_string(),
        ..Post::default()
    };
    post.comments.push(reply);
    post.save(&db).expect("save post");

    assert_eq!(
        db.query_value("SELECT status FROM authors WHERE name = 'Bea'")
            .unwrap(),
        text("reviewer")
    );
    let saved = post.comments.iter().next().expect("comment attached");
    let saved_author = saved.author.get().expect("author attached");
    assert_eq!(saved_author.status.as_deref(), Some("reviewer"));
    assert_eq!(saved.author_id, saved_author.id);
    assert!(saved.author_id.is_some());
}

#[test]
fn sqlite_save_of_a_stored_record_updates_it() {
    let db = service();
    let mut post = saved_post(&db);

    post.title = "Hello again".to_string();
    post.save(&db).expect("second save");

    assert_eq!(count(&db, "posts"), Value::Int(1));
    assert_eq!(count(&db, "authors"), Value::Int(1));
    assert_eq!(count(&db, "comments"), Value::Int(2));
    // the link row is not duplicated
    assert_eq!(count(&db, "post_tags"), Value::Int(1));
    assert_eq!(
        db.query_value("SELECT title FROM posts").unwrap(),
        text("Hello again")
    );
}

#[test]
fn sqlite_failed_save_rolls_back_parents() {
    let db = service();
    let mut post = Post::default();
    post.author.set(author("Ada"));

    let err = post.save(&db).unwrap_err();
    let Error::Validation(validation) = &err else {
        panic!("expected a validation error, got {err}");
    };
    let message = validation.to_string();
    assert!(message.starts_with("'title' must not be empty"), "{message}");
    assert!(message.contains(", class: Post"), "{message}");

    assert_eq!(count(&db, "authors"), Value::Int(0));
    assert_eq!(count(&db, "posts"), Value::Int(0));
    assert!(!db.connection().in_transaction());
}

#[test]
fn sqlite_validation_error_carries_the_record() {
    let db = service();
    let mut blank = author("   ");

    let err = blank.save(&db).unwrap_err();
    let Error::Validation(validation) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(validation.type_name, Some("Author"));
    let data = validation.data.clone().expect("snapshot attached");
    assert_eq!(data["name"], serde_json::json!("   "));

    let message = validation.to_string();
    assert!(message.contains("'name' must not be blank"), "{message}");
    assert!(message.contains(", data: "), "{message}");
    assert!(message.ends_with(", class: Author"), "{message}");
    assert_eq!(count(&db, "authors"), Value::Int(0));
}

#[test]
fn sqlite_path_access_through_relations() {
    let db = service();
    let mut post = saved_post(&db);

    assert_eq!(post.get_path("title").unwrap(), Some(text("Hello")));
    assert_eq!(post.get_path("author.name").unwrap(), Some(text("Ada")));
    assert_eq!(post.get_path("comments.1.body").unwrap(), Some(text("second")));
    assert_eq!(post.get_path("comments.5.body").unwrap(), None);
    assert!(post.get_path("author.missing").is_err());
    assert!(post.get_path("").is_err());

    post.set_path("author.name", "Ada Lovelace").unwrap();
    assert_eq!(post.author.get().map(|a| a.name.as_str()), Some("Ada Lovelace"));

    assert!(post.unset_relation("author"));
    assert_eq!(post.get_path("author.name").unwrap(), None);
    assert!(post.set_path("author.name", "Nobody").is_err());
    assert!(!post.unset_relation("editor"));
}

#[test]
fn sqlite_static_lookups() {
    let db = service();
    for name in ["Cy", "Ada", "Bob"] {
        author(name).save(&db).unwrap();
    }

    let ada = Author::get_by_name(&db, "Ada").unwrap().expect("Ada stored");
    assert_eq!(ada.id, Some(2));
    assert!(Author::get_by_name(&db, "Zed").unwrap().is_none());

    let bob = Author::get_by_id(&db, 3).unwrap().expect("id 3 stored");
    assert_eq!(bob.name, "Bob");
    assert!(Author::get_by_id(&db, 0).unwrap().is_none());
    assert!(Author::get_by_id(&db, Value::Null).unwrap().is_none());

    let some = Author::get_by_id_list(&db, [1_i64, 3]).unwrap();
    assert_eq!(some.len(), 2);
    assert!(Author::get_by_id_list(&db, Vec::<i64>::new()).unwrap().is_empty());

    assert_eq!(Author::find_all(&db).unwrap().len(), 3);
    let first = Author::find_first(
        &db,
        &Select::record::<Author>().order_by(OrderBy::asc("name")),
    )
    .unwrap()
    .expect("one author");
    assert_eq!(first.name, "Ada");

    let names = Author::get_name_list(&db).unwrap();
    assert_eq!(names.len(), 3);

    let map = Author::get_name_map(&db).unwrap();
    let ordered: Vec<(Key, Value)> = map.into_iter().collect();
    assert_eq!(
        ordered,
        vec![
            (Key::Int(2), text("Ada")),
            (Key::Int(3), text("Bob")),
            (Key::Int(1), text("Cy")),
        ]
    );

    let assoc = Author::find_assoc(
        &db,
        &Select::record::<Author>().columns(&["name", "id"]),
    )
    .unwrap();
    assert_eq!(assoc[&Key::from("Cy")], Value::Int(1));

    assert_eq!(db.alias_for::<Author>(), Some("a"));
    assert_eq!(db.table_for::<Post>(), "posts");
}

#[test]
fn sqlite_record_delete() {
    let db = service();
    let post = saved_post(&db);
    let saved_author = post.author.get().expect("author attached");

    let err = saved_author.delete(&db).unwrap_err();
    assert!(err.is_foreign_key_delete(), "unexpected error: {err}");
    assert_eq!(count(&db, "authors"), Value::Int(1));

    let first = post.comments.iter().next().expect("a comment");
    assert!(first.delete(&db).unwrap());
    assert!(!first.delete(&db).unwrap());
    assert_eq!(count(&db, "comments"), Value::Int(1));

    let unsaved = author("Nobody");
    assert!(matches!(unsaved.delete(&db), Err(Error::Argument(_))));
}

#[test]
fn sqlite_relation_fetch_honours_defaults() {
    let db = service();
    db.connection()
        .execute_raw(
            "INSERT INTO authors (id, name, status) VALUES (1, 'Ada', 'inactive');
             INSERT INTO posts (id, title, author_id) VALUES (1, 'Hello', 1);",
        )
        .unwrap();

    let mut post = Post::get_by_id(&db, 1).unwrap().expect("post stored");
    assert!(post.author.get().is_none());

    assert!(db.related::<Author>(&post, "author").unwrap().is_empty());
    db.load_related(&mut post, "author").unwrap();
    assert!(post.author.get().is_none());

    db.connection()
        .execute_raw("UPDATE authors SET status = 'active' WHERE id = 1")
        .unwrap();
    let found = db.related::<Author>(&post, "author").unwrap();
    assert_eq!(found.len(), 1);
    db.load_related(&mut post, "author").unwrap();
    assert_eq!(post.author.get().map(|a| a.name.as_str()), Some("Ada"));

    assert!(matches!(
        db.related::<Author>(&post, "editor"),
        Err(Error::Argument(_))
    ));
    assert!(matches!(
        db.related::<Tag>(&post, "author"),
        Err(Error::Argument(_))
    ));
}

#[test]
fn sqlite_load_collections() {
    let db = service();
    let saved = saved_post(&db);
    let post_id = saved.id.expect("post id");

    let mut post = Post::get_by_id(&db, post_id).unwrap().expect("post stored");
    assert!(post.comments.is_empty());

    db.load_related(&mut post, "comments").unwrap();
    let bodies: Vec<&str> = post.comments.iter().map(|c| c.body.as_str()).collect();
    assert_eq!(bodies, vec!["first", "second"]);

    let tags = db.related::<Tag>(&post, "tags").unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "rust");

    let fresh = Post::default();
    assert!(db.related::<Comment>(&fresh, "comments").unwrap().is_empty());
}
