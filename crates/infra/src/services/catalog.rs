//! Material catalog service: categories, subcategories, materials, warehouses.

use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument};

use buildtrack_audit::AuditContext;
use buildtrack_core::Aggregate;
use buildtrack_inventory::{
    CategoryId, CreateMaterial, Material, MaterialCategory, MaterialCommand, MaterialDetails,
    MaterialId, MaterialSubcategory, SubcategoryId, TransactionType, UpdateMaterial, Warehouse,
    WarehouseDetails, WarehouseId,
};
use buildtrack_projects::ProjectId;

use crate::config::LedgerConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::services::{audit, fetch, log_events};
use crate::store::{InMemoryStore, Tables};

/// Stock-level filter for material listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockFilter {
    /// At or below the reorder threshold (out-of-stock included).
    Low,
    /// Balance is exactly zero.
    Out,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialFilter {
    /// Case-insensitive match on code, name, category or subcategory name.
    pub search: Option<String>,
    pub category: Option<CategoryId>,
    pub subcategory: Option<SubcategoryId>,
    pub stock: Option<StockFilter>,
}

/// Ledger-derived figures for one material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialStats {
    pub total_delivered: Decimal,
    pub total_consumed: Decimal,
    /// Mean unit price of the most recent deliveries, or the catalog price
    /// when there are none.
    pub average_price: Decimal,
    /// Projects with at least one consumption, in id order.
    pub consuming_projects: Vec<ProjectId>,
}

/// Input for a new material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMaterial {
    pub details: MaterialDetails,
    pub opening_stock: Decimal,
}

#[derive(Debug, Clone)]
pub struct CatalogService {
    store: Arc<InMemoryStore>,
    recent_deliveries: usize,
}

fn category_exists(t: &Tables, id: CategoryId) -> ServiceResult<()> {
    if t.categories.contains_key(&id) {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!("category {id} does not exist")))
    }
}

/// The subcategory, when given, must exist and belong to the category.
fn check_subcategory(t: &Tables, details: &MaterialDetails) -> ServiceResult<()> {
    let Some(sub_id) = details.subcategory_id else {
        return Ok(());
    };
    match t.subcategories.get(&sub_id) {
        Some(sub) if sub.category_id == details.category_id => Ok(()),
        Some(_) => Err(ServiceError::Validation(
            "subcategory does not belong to the selected category".to_string(),
        )),
        None => Err(ServiceError::Validation(format!("subcategory {sub_id} does not exist"))),
    }
}

fn code_is_free(t: &Tables, code: &str, own: Option<MaterialId>) -> ServiceResult<()> {
    let code = code.trim();
    let taken = t
        .materials
        .values()
        .any(|m| m.code() == code && Some(m.id_typed()) != own);
    if taken {
        Err(ServiceError::Conflict(format!("material code '{code}' already exists")))
    } else {
        Ok(())
    }
}

impl CatalogService {
    pub fn new(store: Arc<InMemoryStore>, ledger: &LedgerConfig) -> Self {
        Self {
            store,
            recent_deliveries: ledger.recent_deliveries,
        }
    }

    // -- categories --------------------------------------------------------

    #[instrument(skip(self, ctx), err)]
    pub fn create_category(
        &self,
        name: &str,
        description: &str,
        parent: Option<CategoryId>,
        ctx: &AuditContext,
    ) -> ServiceResult<MaterialCategory> {
        let category = MaterialCategory::create(CategoryId::generate(), name, description, parent)?;
        self.store.transaction(|t| {
            t.put_category(category.clone())?;
            audit::created(t, ctx, &category)?;
            Ok(category)
        })
    }

    #[instrument(skip(self, ctx), err)]
    pub fn update_category(
        &self,
        id: CategoryId,
        name: &str,
        description: &str,
        ctx: &AuditContext,
    ) -> ServiceResult<MaterialCategory> {
        self.store.transaction(|t| {
            let before = fetch(&t.categories, id, "category")?;
            let mut after = before.clone();
            after.rename(name, description)?;
            t.put_category(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    /// Delete a category and its subcategories.
    ///
    /// Blocked while any material or child category references it.
    #[instrument(skip(self, ctx), err)]
    pub fn delete_category(&self, id: CategoryId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let category = fetch(&t.categories, id, "category")?;
            if t.materials.values().any(|m| m.category_id() == id) {
                return Err(ServiceError::ReferentialIntegrity(format!(
                    "category '{}' still has materials",
                    category.name
                )));
            }
            if t.categories.values().any(|c| c.parent == Some(id)) {
                return Err(ServiceError::ReferentialIntegrity(format!(
                    "category '{}' still has child categories",
                    category.name
                )));
            }

            let subs: Vec<MaterialSubcategory> = t
                .subcategories
                .values()
                .filter(|s| s.category_id == id)
                .cloned()
                .collect();
            for sub in &subs {
                t.subcategories.remove(&sub.id);
                audit::deleted(t, ctx, sub)?;
            }
            t.categories.remove(&id);
            audit::deleted(t, ctx, &category)?;
            Ok(())
        })
    }

    pub fn list_categories(&self) -> ServiceResult<Vec<MaterialCategory>> {
        let mut out = self.store.read(|t| t.categories.values().cloned().collect::<Vec<_>>())?;
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    // -- subcategories -----------------------------------------------------

    #[instrument(skip(self, ctx), err)]
    pub fn create_subcategory(
        &self,
        category_id: CategoryId,
        name: &str,
        description: &str,
        ctx: &AuditContext,
    ) -> ServiceResult<MaterialSubcategory> {
        let sub = MaterialSubcategory::create(SubcategoryId::generate(), category_id, name, description)?;
        self.store.transaction(|t| {
            category_exists(t, category_id)?;
            t.put_subcategory(sub.clone())?;
            audit::created(t, ctx, &sub)?;
            Ok(sub)
        })
    }

    /// Moving a subcategory to another category is refused while materials
    /// use it (they would end up with a mismatched pair).
    #[instrument(skip(self, ctx), err)]
    pub fn update_subcategory(
        &self,
        id: SubcategoryId,
        category_id: CategoryId,
        name: &str,
        description: &str,
        ctx: &AuditContext,
    ) -> ServiceResult<MaterialSubcategory> {
        self.store.transaction(|t| {
            let before = fetch(&t.subcategories, id, "subcategory")?;
            category_exists(t, category_id)?;
            if before.category_id != category_id
                && t.materials.values().any(|m| m.subcategory_id() == Some(id))
            {
                return Err(ServiceError::ReferentialIntegrity(format!(
                    "subcategory '{}' is used by materials and cannot change category",
                    before.name
                )));
            }
            let mut after = before.clone();
            after.update(category_id, name, description)?;
            t.put_subcategory(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    #[instrument(skip(self, ctx), err)]
    pub fn delete_subcategory(&self, id: SubcategoryId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let sub = fetch(&t.subcategories, id, "subcategory")?;
            if t.materials.values().any(|m| m.subcategory_id() == Some(id)) {
                return Err(ServiceError::ReferentialIntegrity(format!(
                    "subcategory '{}' still has materials",
                    sub.name
                )));
            }
            t.subcategories.remove(&id);
            audit::deleted(t, ctx, &sub)?;
            Ok(())
        })
    }

    pub fn list_subcategories(&self, category_id: CategoryId) -> ServiceResult<Vec<MaterialSubcategory>> {
        Ok(self.store.read(|t| {
            t.subcategories
                .values()
                .filter(|s| s.category_id == category_id)
                .cloned()
                .collect()
        })?)
    }

    // -- materials ---------------------------------------------------------

    #[instrument(skip(self, input, ctx), fields(code = %input.details.code), err)]
    pub fn create_material(&self, input: NewMaterial, ctx: &AuditContext) -> ServiceResult<Material> {
        let id = MaterialId::generate();
        let mut material = Material::empty(id);
        log_events(&material.execute(&MaterialCommand::Create(CreateMaterial {
            material_id: id,
            details: input.details.clone(),
            opening_stock: input.opening_stock,
            occurred_at: ctx.occurred_at,
        }))?);

        let material = self.store.transaction(|t| {
            category_exists(t, input.details.category_id)?;
            check_subcategory(t, &input.details)?;
            code_is_free(t, material.code(), None)?;
            t.put_material(material.clone())?;
            audit::created(t, ctx, &material)?;
            Ok::<_, ServiceError>(material)
        })?;

        info!(material_id = %id, "material created");
        Ok(material)
    }

    /// Update catalog fields. The balance is not part of `details` and is
    /// never touched here.
    #[instrument(skip(self, details, ctx), err)]
    pub fn update_material(
        &self,
        id: MaterialId,
        details: MaterialDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Material> {
        self.store.transaction(|t| {
            let before = fetch(&t.materials, id, "material")?;
            category_exists(t, details.category_id)?;
            check_subcategory(t, &details)?;
            code_is_free(t, &details.code, Some(id))?;

            let mut after = before.clone();
            log_events(&after.execute(&MaterialCommand::Update(UpdateMaterial {
                material_id: id,
                details,
                occurred_at: ctx.occurred_at,
            }))?);
            t.put_material(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    /// Refused while any ledger row references the material.
    #[instrument(skip(self, ctx), err)]
    pub fn delete_material(&self, id: MaterialId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let material = fetch(&t.materials, id, "material")?;
            let history = t.transactions.values().filter(|x| x.material_id == id).count();
            if history > 0 {
                return Err(ServiceError::ReferentialIntegrity(format!(
                    "material '{}' has {history} stock transaction(s)",
                    material.code()
                )));
            }
            t.materials.remove(&id);
            audit::deleted(t, ctx, &material)?;
            Ok(())
        })?;
        info!(material_id = %id, "material deleted");
        Ok(())
    }

    pub fn get_material(&self, id: MaterialId) -> ServiceResult<Material> {
        self.store.read(|t| fetch(&t.materials, id, "material"))?
    }

    /// Materials matching every given filter, ordered by code.
    pub fn list_materials(&self, filter: &MaterialFilter) -> ServiceResult<Vec<Material>> {
        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut out = self.store.read(|t| {
            t.materials
                .values()
                .filter(|m| filter.category.is_none_or(|c| m.category_id() == c))
                .filter(|m| filter.subcategory.is_none_or(|s| m.subcategory_id() == Some(s)))
                .filter(|m| match filter.stock {
                    Some(StockFilter::Low) => m.is_low_stock(),
                    Some(StockFilter::Out) => m.current_stock().is_zero(),
                    None => true,
                })
                .filter(|m| needle.as_deref().is_none_or(|n| search_matches(t, m, n)))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        out.sort_by(|a, b| a.code().cmp(b.code()));
        Ok(out)
    }

    pub fn low_stock(&self) -> ServiceResult<Vec<Material>> {
        self.list_materials(&MaterialFilter {
            stock: Some(StockFilter::Low),
            ..MaterialFilter::default()
        })
    }

    pub fn material_stats(&self, id: MaterialId) -> ServiceResult<MaterialStats> {
        let window = self.recent_deliveries;
        self.store.read(|t| {
            let material = fetch(&t.materials, id, "material")?;
            let mut rows: Vec<_> = t.transactions.values().filter(|x| x.material_id == id).collect();
            rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.recorded_at.cmp(&a.recorded_at)));

            let mut total_delivered = Decimal::ZERO;
            let mut total_consumed = Decimal::ZERO;
            let mut projects = BTreeSet::new();
            for row in &rows {
                match row.kind {
                    TransactionType::Delivery => total_delivered += row.quantity.value(),
                    TransactionType::Consumption => {
                        total_consumed += row.quantity.value();
                        if let Some(p) = row.project_id {
                            projects.insert(p);
                        }
                    }
                }
            }

            let recent: Vec<Decimal> = rows
                .iter()
                .filter(|x| x.kind == TransactionType::Delivery)
                .take(window)
                .map(|x| x.unit_price)
                .collect();
            let average_price = if recent.is_empty() {
                material.unit_price()
            } else {
                recent.iter().copied().sum::<Decimal>() / Decimal::from(recent.len())
            };

            Ok(MaterialStats {
                total_delivered,
                total_consumed,
                average_price,
                consuming_projects: projects.into_iter().collect(),
            })
        })?
    }

    // -- warehouses --------------------------------------------------------

    #[instrument(skip(self, details, ctx), err)]
    pub fn create_warehouse(&self, details: WarehouseDetails, ctx: &AuditContext) -> ServiceResult<Warehouse> {
        let warehouse = Warehouse::create(WarehouseId::generate(), details)?;
        self.store.transaction(|t| {
            if t.warehouses.values().any(|w| w.code == warehouse.code) {
                return Err(ServiceError::Conflict(format!(
                    "warehouse code '{}' already exists",
                    warehouse.code
                )));
            }
            t.put_warehouse(warehouse.clone())?;
            audit::created(t, ctx, &warehouse)?;
            Ok(warehouse)
        })
    }

    #[instrument(skip(self, details, ctx), err)]
    pub fn update_warehouse(
        &self,
        id: WarehouseId,
        details: WarehouseDetails,
        ctx: &AuditContext,
    ) -> ServiceResult<Warehouse> {
        self.store.transaction(|t| {
            let before = fetch(&t.warehouses, id, "warehouse")?;
            let mut after = before.clone();
            after.update(details)?;
            t.put_warehouse(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    #[instrument(skip(self, ctx), err)]
    pub fn set_warehouse_active(&self, id: WarehouseId, active: bool, ctx: &AuditContext) -> ServiceResult<Warehouse> {
        self.store.transaction(|t| {
            let before = fetch(&t.warehouses, id, "warehouse")?;
            let mut after = before.clone();
            if active {
                after.activate();
            } else {
                after.deactivate();
            }
            t.put_warehouse(after.clone())?;
            audit::updated(t, ctx, &before, &after)?;
            Ok(after)
        })
    }

    /// Refused while ledger rows reference the warehouse.
    #[instrument(skip(self, ctx), err)]
    pub fn delete_warehouse(&self, id: WarehouseId, ctx: &AuditContext) -> ServiceResult<()> {
        self.store.transaction(|t| {
            let warehouse = fetch(&t.warehouses, id, "warehouse")?;
            if t.transactions.values().any(|x| x.warehouse_id == Some(id)) {
                return Err(ServiceError::ReferentialIntegrity(format!(
                    "warehouse '{}' has stock transactions",
                    warehouse.code
                )));
            }
            t.warehouses.remove(&id);
            audit::deleted(t, ctx, &warehouse)?;
            Ok(())
        })
    }

    pub fn list_warehouses(&self, active_only: bool) -> ServiceResult<Vec<Warehouse>> {
        let mut out = self.store.read(|t| {
            t.warehouses
                .values()
                .filter(|w| !active_only || w.is_active)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        out.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(out)
    }
}

fn search_matches(t: &Tables, m: &Material, needle: &str) -> bool {
    let hit = |s: &str| s.to_lowercase().contains(needle);
    hit(m.code())
        || hit(m.name())
        || t.categories.get(&m.category_id()).is_some_and(|c| hit(&c.name))
        || m
            .subcategory_id()
            .and_then(|s| t.subcategories.get(&s))
            .is_some_and(|s| hit(&s.name))
}
