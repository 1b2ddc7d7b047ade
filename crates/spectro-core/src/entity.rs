//! The `Entity` trait: the hand-implementable shape a future derive macro
//! would target, and the only contract the rest of the crate relies on to
//! treat an arbitrary Rust struct as a mapped Postgres row.

use futures::future::BoxFuture;
use sqlx::postgres::PgRow;

use crate::connection::Connection;
use crate::error::Error;
use crate::pk::{ForeignKeyWrapper, PrimaryKeyValue, PrimaryKeyWrapper};
use crate::query::preload::PreloadSpec;
use crate::schema::SchemaDescriptor;
use spectro_sql::SqlParam;

/// Implemented once per mapped struct. Compile-time code generation from an
/// attribute macro is explicitly out of scope here; this trait is the shape
/// such a macro would emit.
pub trait Entity: Send + Sync + Sized + Clone + 'static {
    /// The static, process-wide description of this entity's table, primary
    /// key and declared relationships.
    fn schema() -> &'static SchemaDescriptor;

    /// Build one instance from a decoded Postgres row.
    fn from_row(row: &PgRow) -> Result<Self, Error>;

    /// Read back the value of a named column, for use by the repository
    /// when building `INSERT`/`UPDATE` parameter lists.
    fn column_value(&self, column_name: &str) -> SqlParam;

    /// The type-erased primary key of this instance.
    fn primary_key_value(&self) -> PrimaryKeyValue;
}

impl<E: Entity> PrimaryKeyWrapper for E {
    fn primary_key(&self) -> PrimaryKeyValue {
        self.primary_key_value()
    }
}

impl<E: Entity> ForeignKeyWrapper for E {
    fn foreign_key(&self, column_name: &str) -> Option<PrimaryKeyValue> {
        let value = self.column_value(column_name);
        if value.is_null() {
            return None;
        }
        PrimaryKeyValue::from_sql_param(&value).ok()
    }
}

/// One implementation per relationship declared on an entity. `Marker` is a
/// zero-sized type unique to the relation name (e.g. `struct Posts;`),
/// letting callers write `user.load::<Posts>(&repo)` without stringly-typed
/// relation lookups at the call site.
pub trait HasRelation<Marker>: Entity {
    /// The entity type on the other end of the relationship.
    type Related: Entity;

    /// The relationship's name, matching a [`crate::schema::RelationshipInfo`]
    /// on `Self::schema()`.
    fn relation_name() -> &'static str;
}

/// Entities that know how to resolve their own declared preloads.
///
/// [`crate::query::Query::all`]/`first`/`first_or_fail` require this bound so
/// they can splice batch-fetched relation data back into each entity's own
/// `LazyRelation` fields once the main rows are back — work only the
/// concrete struct can do, since it alone knows each relation field's type.
/// A hand-written (or generated) impl matches on `spec.relation_name` and,
/// for each one, calls [`crate::query::preload::resolve_to_many`] with the
/// concrete related entity type, then calls `set_loaded`/`with_loaded` on the
/// matching field.
///
/// The default implementation is a no-op when there's nothing to preload,
/// and otherwise fails: an entity with relationships that never overrides
/// this would silently drop every `with_preload(...)` call, which is worse
/// than an explicit error.
pub trait Preloadable: Entity {
    fn apply_preloads<'a>(
        entities: &'a mut [Self],
        preloads: &'a [PreloadSpec],
        conn: &'a Connection,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if preloads.is_empty() || entities.is_empty() {
                return Ok(());
            }
            Err(Error::RelationshipError {
                schema: Self::schema().schema_name.clone(),
                relation: preloads[0].relation_name.clone(),
                reason: "this entity has no Preloadable impl wiring up its relation fields"
                    .to_string(),
            })
        })
    }
}
