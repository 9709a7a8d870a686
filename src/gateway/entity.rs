//! Transactional CRUD over one entity type

use crate::error::{GatewayError, Result};
use crate::model::{EntityCodec, EntitySchema, Statement};
use crate::store::{sparql, Bindings, GraphClient, GraphTransaction, TxnMode};
use oxigraph::model::{Literal, NamedNode, Term};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Marks the writer whose conditional insert created an entity
const CLAIM_PREDICATE: &str = "urn:entity-graph:claim";

/// Gateway for the entities described by one [`EntitySchema`]
#[derive(Clone)]
pub struct EntityGateway {
    client: Arc<dyn GraphClient>,
    codec: EntityCodec,
}

impl EntityGateway {
    pub fn new(
        client: Arc<dyn GraphClient>,
        namespace: impl Into<String>,
        schema: &'static EntitySchema,
    ) -> Self {
        Self {
            client,
            codec: EntityCodec::new(namespace, schema),
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.codec.schema()
    }

    /// Stores a new entity. Fails with `Conflict` when `entity_id` already
    /// has statements, leaving them untouched.
    ///
    /// The insert only applies while the subject is absent in the store, and
    /// carries a claim statement unique to this call. Whoever finds its claim
    /// afterwards created the entity; every other writer gets `Conflict`.
    pub async fn create(&self, entity_id: &str, json: &Value) -> Result<()> {
        let statements = self.codec.encode(entity_id, json)?;
        let claim = Statement::new(
            statements[0].subject.clone(),
            NamedNode::new_unchecked(CLAIM_PREDICATE),
            Literal::new_simple_literal(Uuid::new_v4().to_string()),
        );

        let mut txn = self.begin("create", entity_id, TxnMode::Write).await?;
        let outcome = self.create_in(txn.as_mut(), entity_id, &statements, &claim).await;
        self.finish("create", entity_id, txn, outcome).await?;

        let mut txn = self.begin("create", entity_id, TxnMode::Read).await?;
        let outcome = txn.ask(&sparql::ask_statement(&claim)).await.map_err(GatewayError::from);
        if !self.finish("create", entity_id, txn, outcome).await? {
            debug!(entity_type = self.schema().entity_type, entity_id, "lost create race");
            return Err(self.conflict(entity_id));
        }
        self.release_claim(entity_id, &claim).await;
        Ok(())
    }

    async fn create_in(
        &self,
        txn: &mut dyn GraphTransaction,
        entity_id: &str,
        statements: &[Statement],
        claim: &Statement,
    ) -> Result<()> {
        let subject = &statements[0].subject;
        if txn.ask(&sparql::ask_subject(subject)).await? {
            return Err(self.conflict(entity_id));
        }
        let mut claimed = statements.to_vec();
        claimed.push(claim.clone());
        txn.update(&sparql::insert_if_absent(subject, &claimed)).await?;
        Ok(())
    }

    /// The entity is stored either way, a leftover claim is never decoded
    async fn release_claim(&self, entity_id: &str, claim: &Statement) {
        let update = sparql::delete_data(std::slice::from_ref(claim));
        let released = match self.client.begin(TxnMode::Write).await {
            Ok(mut txn) => match txn.update(&update).await {
                Ok(()) => txn.commit().await,
                Err(err) => {
                    let _ = txn.abort().await;
                    Err(err)
                }
            },
            Err(err) => Err(err),
        };
        if let Err(err) = released {
            warn!(
                entity_type = self.schema().entity_type,
                entity_id,
                error = %err,
                "failed to release create claim"
            );
        }
    }

    /// Replaces every statement of the entity. Returns `true` when the
    /// entity did not exist before.
    pub async fn create_or_update(&self, entity_id: &str, json: &Value) -> Result<bool> {
        let statements = self.codec.encode(entity_id, json)?;
        let mut txn = self.begin("create_or_update", entity_id, TxnMode::Write).await?;
        let outcome = Self::replace_in(txn.as_mut(), &statements).await;
        self.finish("create_or_update", entity_id, txn, outcome).await
    }

    async fn replace_in(txn: &mut dyn GraphTransaction, statements: &[Statement]) -> Result<bool> {
        let subject = &statements[0].subject;
        let existed = txn.ask(&sparql::ask_subject(subject)).await?;
        if existed {
            txn.update(&sparql::delete_subject(subject)).await?;
        }
        txn.load(statements).await?;
        Ok(!existed)
    }

    /// Overwrites the properties present in `json` and keeps all others.
    /// Fails with `NotFound` when the entity does not exist.
    pub async fn patch(&self, entity_id: &str, json: &Value) -> Result<()> {
        let statements = self.codec.encode(entity_id, json)?;
        let mut txn = self.begin("patch", entity_id, TxnMode::Write).await?;
        let outcome = self.patch_in(txn.as_mut(), entity_id, &statements).await;
        self.finish("patch", entity_id, txn, outcome).await
    }

    async fn patch_in(
        &self,
        txn: &mut dyn GraphTransaction,
        entity_id: &str,
        statements: &[Statement],
    ) -> Result<()> {
        let subject = &statements[0].subject;
        if !txn.ask(&sparql::ask_subject(subject)).await? {
            return Err(self.not_found(entity_id));
        }
        // the type statement stays, so the guarded insert still sees the
        // subject unless a concurrent delete removed it
        let properties = &statements[1..];
        if properties.is_empty() {
            return Ok(());
        }
        for statement in properties {
            txn.update(&sparql::delete_property(subject, &statement.predicate)).await?;
        }
        txn.update(&sparql::insert_if_present(subject, properties)).await?;
        Ok(())
    }

    pub async fn read(&self, entity_id: &str) -> Result<Value> {
        let subject = self.codec.subject(entity_id)?;
        let mut txn = self.begin("read", entity_id, TxnMode::Read).await?;
        let outcome = self.read_in(txn.as_mut(), entity_id, &subject).await;
        self.finish("read", entity_id, txn, outcome).await
    }

    async fn read_in(
        &self,
        txn: &mut dyn GraphTransaction,
        entity_id: &str,
        subject: &NamedNode,
    ) -> Result<Value> {
        let mut pairs = Vec::new();
        txn.select(&sparql::select_subject(subject), &mut |mut row: Bindings| {
            if let (Some(Term::NamedNode(predicate)), Some(object)) =
                (row.remove("p"), row.remove("o"))
            {
                pairs.push((predicate, object));
            }
        })
        .await?;
        if pairs.is_empty() {
            return Err(self.not_found(entity_id));
        }
        Ok(self.codec.decode(entity_id, pairs))
    }

    /// Summary views of every entity of this type, ordered by id
    pub async fn list(&self) -> Result<Vec<Value>> {
        let mut txn = self.begin("list", "", TxnMode::Read).await?;
        let outcome = self.list_in(txn.as_mut()).await;
        self.finish("list", "", txn, outcome).await
    }

    async fn list_in(&self, txn: &mut dyn GraphTransaction) -> Result<Vec<Value>> {
        let predicates: Vec<NamedNode> = self
            .schema()
            .summary_properties()
            .map(|p| self.codec.predicate_uri(p.name))
            .collect();
        let query = sparql::select_typed(&self.codec.type_uri(), &predicates);

        let mut entities: BTreeMap<String, Vec<(NamedNode, Term)>> = BTreeMap::new();
        let codec = &self.codec;
        txn.select(&query, &mut |mut row: Bindings| {
            let Some(Term::NamedNode(subject)) = row.remove("s") else {
                return;
            };
            let Some(id) = codec.id_from_subject(subject.as_str()) else {
                return;
            };
            let pairs = entities.entry(id.to_string()).or_default();
            if let (Some(Term::NamedNode(predicate)), Some(object)) =
                (row.remove("p"), row.remove("o"))
            {
                pairs.push((predicate, object));
            }
        })
        .await?;

        Ok(entities.into_iter().map(|(id, pairs)| self.codec.decode(&id, pairs)).collect())
    }

    /// Removes every statement of the entity. Deleting an absent entity succeeds.
    pub async fn delete(&self, entity_id: &str) -> Result<()> {
        let subject = self.codec.subject(entity_id)?;
        let mut txn = self.begin("delete", entity_id, TxnMode::Write).await?;
        let outcome =
            txn.update(&sparql::delete_subject(&subject)).await.map_err(GatewayError::from);
        self.finish("delete", entity_id, txn, outcome).await
    }

    async fn begin(
        &self,
        op: &'static str,
        entity_id: &str,
        mode: TxnMode,
    ) -> Result<Box<dyn GraphTransaction>> {
        self.client.begin(mode).await.map_err(|e| self.store_failure(op, entity_id, e.into()))
    }

    /// Commits on success and aborts on every error branch
    async fn finish<T>(
        &self,
        op: &'static str,
        entity_id: &str,
        txn: Box<dyn GraphTransaction>,
        outcome: Result<T>,
    ) -> Result<T> {
        match outcome {
            Ok(value) => {
                txn.commit().await.map_err(|e| self.store_failure(op, entity_id, e.into()))?;
                debug!(entity_type = self.schema().entity_type, entity_id, op, "committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort().await {
                    warn!(
                        entity_type = self.schema().entity_type,
                        entity_id,
                        op,
                        error = %abort_err,
                        "abort failed"
                    );
                }
                match err {
                    GatewayError::StoreUnavailable(_) => {
                        Err(self.store_failure(op, entity_id, err))
                    }
                    other => Err(other),
                }
            }
        }
    }

    fn store_failure(&self, op: &'static str, entity_id: &str, err: GatewayError) -> GatewayError {
        error!(
            entity_type = self.schema().entity_type,
            entity_id,
            op,
            error = %err,
            "store operation failed"
        );
        err
    }

    fn conflict(&self, entity_id: &str) -> GatewayError {
        GatewayError::Conflict(format!(
            "{} '{}' already exists",
            self.schema().entity_type,
            entity_id
        ))
    }

    fn not_found(&self, entity_id: &str) -> GatewayError {
        GatewayError::NotFound(format!("{} '{}' not found", self.schema().entity_type, entity_id))
    }
}
