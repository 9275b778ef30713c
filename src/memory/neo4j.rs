//! Neo4j backend speaking the HTTP transactional Cypher API.
//!
//! The first session on a store creates a uniqueness constraint on the
//! entity name, which makes concurrent `MERGE`s on one name converge.
//! Every statement is sent to `/db/{database}/tx/commit` and commits on its
//! own, so a failure mid-write leaves earlier merges in place. Values always
//! travel as parameters; the relation type is the only identifier spliced
//! into Cypher, and only in its sanitized, backtick-quoted form.

use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::store::{EdgeMerge, GraphCounts, GraphSession, GraphStore};
use crate::domain::{Entity, RelationType, ENTITY_LABEL};
use crate::error::GraphError;

#[derive(Debug, Clone)]
pub struct Neo4jStoreConfig {
    /// HTTP(S) base URI of the server, e.g. `http://localhost:7474`. The
    /// Bolt default `bolt://host:7687` is mapped to `http://host:7474`.
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout: Duration,
}

pub struct Neo4jStore {
    http: HttpClient,
    commit_url: String,
    user: String,
    password: String,
    schema: OnceCell<()>,
}

impl Neo4jStore {
    pub fn connect(config: &Neo4jStoreConfig) -> Result<Self, GraphError> {
        let uri = http_base_uri(&config.uri)?;
        if config.database.trim().is_empty() {
            return Err(GraphError::Config("nom de base de données vide".to_string()));
        }

        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GraphError::Config(format!("client HTTP Neo4j: {err}")))?;

        Ok(Self {
            http,
            commit_url: format!("{uri}/db/{}/tx/commit", config.database.trim()),
            user: config.user.clone(),
            password: config.password.clone(),
            schema: OnceCell::new(),
        })
    }

    fn ensure_name_constraint(&self) -> Result<(), GraphError> {
        self.run_one(Statement::new(name_constraint_cypher()))?;
        info!(label = ENTITY_LABEL, "contrainte d'unicité sur le nom en place");
        Ok(())
    }

    fn run(&self, statements: Vec<Statement>) -> Result<Vec<StatementResult>, GraphError> {
        debug!(
            url = %self.commit_url,
            statements = ?statements.iter().map(|s| s.statement.as_str()).collect::<Vec<_>>(),
            "envoi de requêtes Cypher"
        );
        let response = self
            .http
            .post(&self.commit_url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&TxRequest { statements })
            .send()
            .map_err(|err| GraphError::Connectivity(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GraphError::Connectivity(format!(
                "statut HTTP {status} depuis Neo4j: {body}"
            )));
        }

        let parsed: TxResponse = response
            .json()
            .map_err(|err| GraphError::Connectivity(format!("réponse Neo4j illisible: {err}")))?;

        if let Some(first) = parsed.errors.into_iter().next() {
            return Err(GraphError::Query {
                code: first.code,
                message: first.message,
            });
        }
        Ok(parsed.results)
    }

    fn run_one(&self, statement: Statement) -> Result<StatementResult, GraphError> {
        self.run(vec![statement])?
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::Connectivity("réponse Neo4j sans résultat".to_string()))
    }
}

impl GraphStore for Neo4jStore {
    fn session(&self) -> Result<Box<dyn GraphSession + '_>, GraphError> {
        self.schema.get_or_try_init(|| self.ensure_name_constraint())?;
        Ok(Box::new(Neo4jSession { store: self }))
    }

    fn verify_connectivity(&self) -> Result<(), GraphError> {
        self.run_one(Statement::new("RETURN 1"))?;
        Ok(())
    }
}

struct Neo4jSession<'a> {
    store: &'a Neo4jStore,
}

impl GraphSession for Neo4jSession<'_> {
    fn merge_entity(&mut self, entity: &Entity) -> Result<(), GraphError> {
        let statement = Statement::new(format!("MERGE (n:{ENTITY_LABEL} {{name: $name}})"))
            .param("name", entity.name());
        self.store.run_one(statement)?;
        Ok(())
    }

    fn merge_relation(
        &mut self,
        source: &str,
        kind: &RelationType,
        target: &str,
    ) -> Result<EdgeMerge, GraphError> {
        let statement = Statement::new(merge_relation_cypher(kind))
            .param("source", source)
            .param("target", target);
        let result = self.store.run_one(statement)?;
        if result.first_count() > 0 {
            Ok(EdgeMerge::Merged)
        } else {
            Ok(EdgeMerge::EndpointMissing)
        }
    }

    fn delete_all(&mut self) -> Result<GraphCounts, GraphError> {
        let result = self
            .store
            .run_one(Statement::new("MATCH (n) DETACH DELETE n").with_stats())?;
        let stats = result.stats.unwrap_or_default();
        Ok(GraphCounts {
            nodes: stats.nodes_deleted,
            edges: stats.relationships_deleted,
        })
    }

    fn counts(&mut self) -> Result<GraphCounts, GraphError> {
        let results = self.store.run(vec![
            Statement::new("MATCH (n) RETURN count(n)"),
            Statement::new("MATCH ()-[r]->() RETURN count(r)"),
        ])?;
        let mut counts = results.iter().map(StatementResult::first_count);
        Ok(GraphCounts {
            nodes: counts.next().unwrap_or(0),
            edges: counts.next().unwrap_or(0),
        })
    }

    fn close(self: Box<Self>) -> Result<(), GraphError> {
        Ok(())
    }
}

/// Accepts HTTP(S) URIs as-is and maps Bolt URIs on the default port 7687
/// to the HTTP connector's default port.
fn http_base_uri(raw: &str) -> Result<String, GraphError> {
    let uri = raw.trim().trim_end_matches('/');
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Ok(uri.to_string());
    }

    let translated = uri.split_once("://").and_then(|(scheme, rest)| {
        let (http_scheme, http_port) = match scheme {
            "bolt" | "neo4j" => ("http", 7474),
            "bolt+s" | "neo4j+s" => ("https", 7473),
            _ => return None,
        };
        let host = match rest.rsplit_once(':') {
            Some((host, "7687")) => host,
            Some(_) => return None,
            None => rest,
        };
        (!host.is_empty() && !host.contains('/')).then(|| format!("{http_scheme}://{host}:{http_port}"))
    });

    match translated {
        Some(http) => {
            warn!(bolt = uri, http = %http, "URI Bolt remplacée par l'adresse HTTP du serveur");
            Ok(http)
        }
        None => Err(GraphError::Config(format!(
            "URI {uri:?} non prise en charge: utiliser l'adresse HTTP(S) du serveur Neo4j (ex. http://localhost:7474)"
        ))),
    }
}

fn name_constraint_cypher() -> String {
    format!(
        "CREATE CONSTRAINT entity_name IF NOT EXISTS \
         FOR (n:{ENTITY_LABEL}) REQUIRE n.name IS UNIQUE"
    )
}

fn merge_relation_cypher(kind: &RelationType) -> String {
    format!(
        "MATCH (a:{ENTITY_LABEL} {{name: $source}}) \
         MATCH (b:{ENTITY_LABEL} {{name: $target}}) \
         MERGE (a)-[r:`{kind}`]->(b) \
         RETURN count(r)"
    )
}

#[derive(Debug, Serialize)]
struct TxRequest {
    statements: Vec<Statement>,
}

#[derive(Debug, Serialize)]
struct Statement {
    statement: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    parameters: Map<String, Value>,
    #[serde(rename = "includeStats", skip_serializing_if = "std::ops::Not::not")]
    include_stats: bool,
}

impl Statement {
    fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: Map::new(),
            include_stats: false,
        }
    }

    fn param(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), json!(value));
        self
    }

    fn with_stats(mut self) -> Self {
        self.include_stats = true;
        self
    }
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<ResultRow>,
    #[serde(default)]
    stats: Option<StatementStats>,
}

impl StatementResult {
    fn first_count(&self) -> u64 {
        self.data
            .first()
            .and_then(|row| row.row.first())
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
struct ResultRow {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementStats {
    #[serde(default)]
    nodes_deleted: u64,
    #[serde(default)]
    relationships_deleted: u64,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const COMMIT_PATH: &str = "/db/neo4j/tx/commit";
    const BASIC_AUTH: &str = "Basic bmVvNGo6c2VjcmV0";

    fn store(server: &mockito::Server) -> Neo4jStore {
        Neo4jStore::connect(&Neo4jStoreConfig {
            uri: format!("{}/", server.url()),
            user: "neo4j".to_string(),
            password: "secret".to_string(),
            database: "neo4j".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn schema_mock(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", COMMIT_PATH)
            .match_body(Matcher::Regex("CREATE CONSTRAINT entity_name".to_string()))
            .with_status(200)
            .with_body(r#"{"results":[{"columns":[],"data":[]}],"errors":[]}"#)
            .create()
    }

    fn count_body(count: u64) -> String {
        json!({
            "results": [{"columns": ["count(r)"], "data": [{"row": [count], "meta": [null]}]}],
            "errors": []
        })
        .to_string()
    }

    #[test]
    fn default_bolt_uri_maps_to_http_connector() {
        let store = Neo4jStore::connect(&Neo4jStoreConfig {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(store.commit_url, "http://localhost:7474/db/neo4j/tx/commit");

        assert_eq!(
            http_base_uri("neo4j+s://db.example.com").unwrap(),
            "https://db.example.com:7473"
        );
        assert_eq!(http_base_uri(" http://h:7474/ ").unwrap(), "http://h:7474");
    }

    #[test]
    fn unmappable_uris_are_rejected() {
        for uri in ["bolt://localhost:9999", "ftp://localhost", "localhost:7474", "bolt://:7687"] {
            assert!(
                matches!(http_base_uri(uri), Err(GraphError::Config(_))),
                "{uri} should be rejected"
            );
        }
    }

    #[test]
    fn first_session_creates_name_constraint_once() {
        let mut server = mockito::Server::new();
        let schema = server
            .mock("POST", COMMIT_PATH)
            .match_body(Matcher::Regex("CREATE CONSTRAINT entity_name".to_string()))
            .with_status(200)
            .with_body(r#"{"results":[{"columns":[],"data":[]}],"errors":[]}"#)
            .expect(1)
            .create();
        let counts = server
            .mock("POST", COMMIT_PATH)
            .match_body(Matcher::Regex("RETURN count\\(n\\)".to_string()))
            .with_status(200)
            .with_body(r#"{"results":[{"data":[{"row":[0]}]},{"data":[{"row":[0]}]}],"errors":[]}"#)
            .expect(2)
            .create();

        let store = store(&server);
        for _ in 0..2 {
            let mut session = store.session().unwrap();
            assert_eq!(session.counts().unwrap(), GraphCounts::default());
        }
        schema.assert();
        counts.assert();
        assert!(name_constraint_cypher().contains("FOR (n:Entity) REQUIRE n.name IS UNIQUE"));
    }

    #[test]
    fn failed_constraint_blocks_the_session() {
        let mut server = mockito::Server::new();
        let _schema = server
            .mock("POST", COMMIT_PATH)
            .with_status(200)
            .with_body(
                json!({
                    "results": [],
                    "errors": [{"code": "Neo.ClientError.Schema.ConstraintCreationFailed", "message": "duplicates"}]
                })
                .to_string(),
            )
            .create();

        let store = store(&server);
        assert!(matches!(store.session().err(), Some(GraphError::Query { .. })));
    }

    #[test]
    fn relation_type_is_quoted_and_values_are_parameters() {
        let kind = RelationType::sanitize("认识").unwrap();
        let cypher = merge_relation_cypher(&kind);
        assert!(cypher.contains("MERGE (a)-[r:`认识`]->(b)"));
        assert!(cypher.contains("{name: $source}"));
        assert!(cypher.contains("{name: $target}"));
    }

    #[test]
    fn merge_entity_sends_parameterised_merge() {
        let mut server = mockito::Server::new();
        let _schema = schema_mock(&mut server);
        let mock = server
            .mock("POST", COMMIT_PATH)
            .match_header("authorization", BASIC_AUTH)
            .match_body(Matcher::PartialJson(json!({
                "statements": [{
                    "statement": "MERGE (n:Entity {name: $name})",
                    "parameters": {"name": "甲"}
                }]
            })))
            .with_status(200)
            .with_body(r#"{"results":[{"columns":[],"data":[]}],"errors":[]}"#)
            .create();

        let store = store(&server);
        let mut session = store.session().unwrap();
        session.merge_entity(&Entity::new("甲").unwrap()).unwrap();
        mock.assert();
    }

    #[test]
    fn unmatched_endpoints_report_missing() {
        let mut server = mockito::Server::new();
        let _schema = schema_mock(&mut server);
        let _mock = server
            .mock("POST", COMMIT_PATH)
            .match_body(Matcher::Regex("MERGE \\(a\\)-\\[r:`knows`\\]->\\(b\\)".to_string()))
            .with_status(200)
            .with_body(count_body(0))
            .create();

        let store = store(&server);
        let mut session = store.session().unwrap();
        let kind = RelationType::sanitize("knows").unwrap();
        assert_eq!(
            session.merge_relation("a", &kind, "ghost").unwrap(),
            EdgeMerge::EndpointMissing
        );
    }

    #[test]
    fn matched_endpoints_report_merged() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", COMMIT_PATH)
            .with_status(200)
            .with_body(count_body(1))
            .create();

        let store = store(&server);
        let mut session = store.session().unwrap();
        let kind = RelationType::sanitize("knows").unwrap();
        assert_eq!(
            session.merge_relation("a", &kind, "b").unwrap(),
            EdgeMerge::Merged
        );
    }

    #[test]
    fn delete_all_reads_stats() {
        let mut server = mockito::Server::new();
        let _schema = schema_mock(&mut server);
        let _mock = server
            .mock("POST", COMMIT_PATH)
            .match_body(Matcher::PartialJson(json!({
                "statements": [{"statement": "MATCH (n) DETACH DELETE n", "includeStats": true}]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "results": [{
                        "columns": [], "data": [],
                        "stats": {"contains_updates": true, "nodes_deleted": 4, "relationships_deleted": 3}
                    }],
                    "errors": []
                })
                .to_string(),
            )
            .create();

        let store = store(&server);
        let mut session = store.session().unwrap();
        assert_eq!(
            session.delete_all().unwrap(),
            GraphCounts { nodes: 4, edges: 3 }
        );
    }

    #[test]
    fn counts_reads_both_statements() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", COMMIT_PATH)
            .with_status(200)
            .with_body(
                json!({
                    "results": [
                        {"columns": ["count(n)"], "data": [{"row": [7]}]},
                        {"columns": ["count(r)"], "data": [{"row": [5]}]}
                    ],
                    "errors": []
                })
                .to_string(),
            )
            .create();

        let store = store(&server);
        let mut session = store.session().unwrap();
        assert_eq!(session.counts().unwrap(), GraphCounts { nodes: 7, edges: 5 });
    }

    #[test]
    fn cypher_errors_become_query_errors() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", COMMIT_PATH)
            .with_status(200)
            .with_body(
                json!({
                    "results": [],
                    "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input"}]
                })
                .to_string(),
            )
            .create();

        let store = store(&server);
        let err = store.verify_connectivity().unwrap_err();
        assert!(matches!(err, GraphError::Query { ref code, .. } if code.ends_with("SyntaxError")));
    }

    #[test]
    fn auth_failure_is_connectivity_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", COMMIT_PATH)
            .with_status(401)
            .with_body(r#"{"errors":[{"code":"Neo.ClientError.Security.Unauthorized","message":"no"}]}"#)
            .create();

        let err = store(&server).verify_connectivity().unwrap_err();
        assert!(matches!(err, GraphError::Connectivity(ref msg) if msg.contains("401")));
    }
}
