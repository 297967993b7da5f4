//! Postgres store.
//!
//! Cart adds are `ON CONFLICT` upserts on `(user_id, line_key)`. Checkout and
//! cancellation run in one transaction; stock only moves through conditional
//! updates so concurrent checkouts cannot oversell.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Page, Paginated, Store};
use crate::domain::aggregates::{
    Cart, CartLine, NewCartLine, OrderGroup, OrderItem, OrderStatus, Product, QuantityChange, QuantityOutcome,
    Restock, Variant, Wishlist, WishlistItem,
};
use crate::domain::value_objects::{Money, Pricing, ProductType, Quantity};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| EcommerceError::Storage(e.to_string()))?;
        info!("database migrations applied");
        Ok(())
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid, slug: String, title: String, category_id: Option<Uuid>, is_variant_available: bool, currency: String,
    original_price: Decimal, discounted_price: Option<Decimal>, shipping_price: Decimal, stock: i32,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: Uuid, product_id: Uuid, size: String, color: String, original_price: Option<Decimal>,
    discounted_price: Option<Decimal>, shipping_price: Option<Decimal>, preview_images: Vec<String>,
    slide_images: Vec<String>, stock: i32, available: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, product_type: String, quantity: i32,
    rent_days: Option<i32>, added_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct WishlistRow { id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, added_at: DateTime<Utc> }

#[derive(Debug, sqlx::FromRow)]
struct GroupRow { id: Uuid, user_id: Uuid, product_type: String, status: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid, order_group_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, title: String, size: Option<String>,
    color: Option<String>, currency: String, unit_price: Decimal, shipping_price: Decimal, quantity: i32,
    line_total: Decimal, rent_days: Option<i32>, status: String,
}

fn corrupt(what: &str) -> EcommerceError { EcommerceError::Storage(format!("corrupt {what} in database")) }

fn to_u32(v: i32, what: &str) -> Result<u32> { u32::try_from(v).map_err(|_| corrupt(what)) }

fn to_i32(v: u32) -> Result<i32> { i32::try_from(v).map_err(|_| EcommerceError::Validation(format!("{v} is too large"))) }

fn product_from_rows(row: ProductRow, variants: Vec<VariantRow>) -> Result<Product> {
    let currency = row.currency.as_str();
    let shipping = Money::new(row.shipping_price, currency);
    let pricing = Pricing {
        original: Money::new(row.original_price, currency),
        discounted: row.discounted_price.map(|d| Money::new(d, currency)),
        shipping: shipping.clone(),
    };
    let variants = variants.into_iter().map(|v| {
        Ok(Variant {
            id: v.id,
            size: v.size,
            color: v.color,
            pricing: v.original_price.map(|original| Pricing {
                original: Money::new(original, currency),
                discounted: v.discounted_price.map(|d| Money::new(d, currency)),
                shipping: v.shipping_price.map(|s| Money::new(s, currency)).unwrap_or_else(|| shipping.clone()),
            }),
            preview_images: v.preview_images,
            slide_images: v.slide_images,
            stock: to_u32(v.stock, "variant stock")?,
            available: v.available,
        })
    }).collect::<Result<Vec<_>>>()?;
    Ok(Product::restore(row.id, row.slug, row.title, row.category_id, row.is_variant_available, pricing,
        to_u32(row.stock, "product stock")?, variants, row.created_at, row.updated_at)?)
}

fn line_from_row(row: CartRow) -> Result<CartLine> {
    Ok(CartLine {
        id: row.id,
        product_id: row.product_id,
        variant_id: row.variant_id,
        product_type: row.product_type.parse().map_err(|_| corrupt("product type"))?,
        quantity: Quantity::new(to_u32(row.quantity, "quantity")?).map_err(|_| corrupt("quantity"))?,
        rent_days: row.rent_days.map(|d| to_u32(d, "rent days")).transpose()?,
        added_at: row.added_at,
        updated_at: row.updated_at,
    })
}

fn wishlist_item_from_row(row: WishlistRow) -> WishlistItem {
    WishlistItem { id: row.id, product_id: row.product_id, variant_id: row.variant_id, added_at: row.added_at }
}

fn item_from_row(row: ItemRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: row.id,
        product_id: row.product_id,
        variant_id: row.variant_id,
        title: row.title,
        size: row.size,
        color: row.color,
        unit_price: Money::new(row.unit_price, &row.currency),
        shipping: Money::new(row.shipping_price, &row.currency),
        quantity: Quantity::new(to_u32(row.quantity, "quantity")?).map_err(|_| corrupt("quantity"))?,
        line_total: Money::new(row.line_total, &row.currency),
        rent_days: row.rent_days.map(|d| to_u32(d, "rent days")).transpose()?,
        status: row.status.parse().map_err(|_| corrupt("order item status"))?,
    })
}

fn group_from_rows(row: GroupRow, items: Vec<OrderItem>) -> Result<OrderGroup> {
    Ok(OrderGroup::restore(
        row.id, row.user_id,
        row.product_type.parse().map_err(|_| corrupt("product type"))?,
        row.status.parse().map_err(|_| corrupt("order status"))?,
        items, row.created_at, row.updated_at,
    )?)
}

fn wishlist_key(product_id: Uuid, variant_id: Option<Uuid>) -> String {
    match variant_id { Some(v) => format!("{product_id}:{v}"), None => format!("{product_id}:-") }
}

// =============================================================================
// Queries
// =============================================================================

const SELECT_PRODUCTS: &str = "SELECT * FROM products WHERE id = ANY($1)";
// rows are always locked in id order so checkout and cancellation cannot deadlock
const SELECT_PRODUCTS_FOR_UPDATE: &str = "SELECT * FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE";
const SELECT_CART_LINE_FOR_UPDATE: &str = "SELECT * FROM cart_items WHERE id = $1 AND user_id = $2 FOR UPDATE";
const UPSERT_CART_LINE: &str = "INSERT INTO cart_items (id, user_id, product_id, variant_id, product_type, line_key, quantity, rent_days, added_at, updated_at) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()) \
    ON CONFLICT (user_id, line_key) DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $9), \
    rent_days = COALESCE(EXCLUDED.rent_days, cart_items.rent_days), updated_at = NOW() RETURNING *";

async fn load_products(conn: &mut PgConnection, ids: &[Uuid], for_update: bool) -> Result<HashMap<Uuid, Product>> {
    let sql = if for_update { SELECT_PRODUCTS_FOR_UPDATE } else { SELECT_PRODUCTS };
    let rows = sqlx::query_as::<_, ProductRow>(sql).bind(ids).fetch_all(&mut *conn).await?;
    let variant_rows = sqlx::query_as::<_, VariantRow>("SELECT * FROM product_variants WHERE product_id = ANY($1) ORDER BY position")
        .bind(ids).fetch_all(&mut *conn).await?;
    let mut by_product: HashMap<Uuid, Vec<VariantRow>> = HashMap::new();
    for v in variant_rows { by_product.entry(v.product_id).or_default().push(v); }
    rows.into_iter()
        .map(|row| {
            let variants = by_product.remove(&row.id).unwrap_or_default();
            product_from_rows(row, variants).map(|p| (p.id(), p))
        })
        .collect()
}

async fn load_one_product(conn: &mut PgConnection, id: Uuid, for_update: bool) -> Result<Product> {
    load_products(conn, &[id], for_update).await?.remove(&id).ok_or_else(|| EcommerceError::product_not_found(id))
}

async fn write_product_pricing(conn: &mut PgConnection, product: &Product, variant_id: Option<Uuid>) -> Result<()> {
    match variant_id {
        None => {
            let p = product.pricing();
            sqlx::query("UPDATE products SET original_price = $2, discounted_price = $3, shipping_price = $4, updated_at = NOW() WHERE id = $1")
                .bind(product.id()).bind(p.original.amount()).bind(p.discounted.as_ref().map(Money::amount)).bind(p.shipping.amount())
                .execute(&mut *conn).await?;
        }
        Some(id) => {
            let p = product.pricing_for(Some(id));
            sqlx::query("UPDATE product_variants SET original_price = $2, discounted_price = $3, shipping_price = $4 WHERE id = $1")
                .bind(id).bind(p.original.amount()).bind(p.discounted.as_ref().map(Money::amount)).bind(p.shipping.amount())
                .execute(&mut *conn).await?;
            sqlx::query("UPDATE products SET updated_at = NOW() WHERE id = $1").bind(product.id()).execute(&mut *conn).await?;
        }
    }
    Ok(())
}

async fn upsert_cart_line(conn: &mut PgConnection, user_id: Uuid, line: &NewCartLine) -> Result<CartLine> {
    let row = sqlx::query_as::<_, CartRow>(UPSERT_CART_LINE)
        .bind(Uuid::now_v7()).bind(user_id).bind(line.product_id).bind(line.variant_id)
        .bind(line.product_type.as_str()).bind(line.key().to_string()).bind(to_i32(line.quantity.value())?)
        .bind(line.rent_days.map(to_i32).transpose()?).bind(to_i32(Quantity::MAX.value())?)
        .fetch_one(&mut *conn).await?;
    line_from_row(row)
}

async fn locked_line(conn: &mut PgConnection, user_id: Uuid, line_id: Uuid) -> Result<CartLine> {
    let row = sqlx::query_as::<_, CartRow>(SELECT_CART_LINE_FOR_UPDATE).bind(line_id).bind(user_id)
        .fetch_optional(&mut *conn).await?
        .ok_or_else(|| EcommerceError::NotFound(format!("Cart item {line_id}")))?;
    line_from_row(row)
}

async fn load_items(conn: &mut PgConnection, group_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
    let rows = sqlx::query_as::<_, ItemRow>("SELECT * FROM order_items WHERE order_group_id = ANY($1) ORDER BY position")
        .bind(group_ids).fetch_all(&mut *conn).await?;
    let mut by_group: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in rows {
        let group_id = row.order_group_id;
        by_group.entry(group_id).or_default().push(item_from_row(row)?);
    }
    Ok(by_group)
}

async fn load_group(conn: &mut PgConnection, user_id: Uuid, group_id: Uuid, for_update: bool) -> Result<Option<OrderGroup>> {
    let sql = if for_update {
        "SELECT * FROM order_groups WHERE id = $1 AND user_id = $2 FOR UPDATE"
    } else {
        "SELECT * FROM order_groups WHERE id = $1 AND user_id = $2"
    };
    let Some(row) = sqlx::query_as::<_, GroupRow>(sql).bind(group_id).bind(user_id).fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };
    let items = load_items(conn, &[group_id]).await?.remove(&group_id).unwrap_or_default();
    group_from_rows(row, items).map(Some)
}

async fn write_statuses(conn: &mut PgConnection, group: &OrderGroup) -> Result<()> {
    sqlx::query("UPDATE order_groups SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(group.id()).bind(group.status().as_str()).bind(group.updated_at())
        .execute(&mut *conn).await?;
    let cancelled: Vec<Uuid> = group.items().iter().filter(|i| i.status == OrderStatus::Cancelled).map(|i| i.id).collect();
    sqlx::query("UPDATE order_items SET status = 'cancelled' WHERE order_group_id = $1 AND id = ANY($2)")
        .bind(group.id()).bind(&cancelled[..])
        .execute(&mut *conn).await?;
    Ok(())
}

async fn restock(conn: &mut PgConnection, restock: &[Restock]) -> Result<()> {
    let mut restock = restock.to_vec();
    restock.sort_by_key(|r| (r.product_id, r.variant_id));
    let product_ids: Vec<Uuid> = restock.iter().map(|r| r.product_id).collect();
    sqlx::query("SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(&product_ids[..]).execute(&mut *conn).await?;
    for r in &restock {
        let qty = to_i32(r.quantity)?;
        let done = match r.variant_id {
            Some(v) => sqlx::query("UPDATE product_variants SET stock = stock + $1 WHERE id = $2 AND product_id = $3")
                .bind(qty).bind(v).bind(r.product_id).execute(&mut *conn).await?,
            None => sqlx::query("UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2")
                .bind(qty).bind(r.product_id).execute(&mut *conn).await?,
        };
        if done.rows_affected() == 0 {
            warn!(product_id = %r.product_id, variant_id = ?r.variant_id, "restock skipped, product or variant gone");
        }
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let p = product.pricing();
        sqlx::query("INSERT INTO products (id, slug, title, category_id, is_variant_available, currency, original_price, discounted_price, shipping_price, stock, created_at, updated_at) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(product.id()).bind(product.slug()).bind(product.title()).bind(product.category_id())
            .bind(product.is_variant_available()).bind(p.currency()).bind(p.original.amount())
            .bind(p.discounted.as_ref().map(Money::amount)).bind(p.shipping.amount()).bind(to_i32(product.stock())?)
            .bind(product.created_at()).bind(product.updated_at())
            .execute(&mut *tx).await?;
        for (position, v) in product.variants().iter().enumerate() {
            let vp = v.pricing.as_ref();
            sqlx::query("INSERT INTO product_variants (id, product_id, position, size, color, original_price, discounted_price, shipping_price, preview_images, slide_images, stock, available) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
                .bind(v.id).bind(product.id()).bind(i32::try_from(position).unwrap_or(i32::MAX)).bind(&v.size).bind(&v.color)
                .bind(vp.map(|p| p.original.amount())).bind(vp.and_then(|p| p.discounted.as_ref().map(Money::amount)))
                .bind(vp.map(|p| p.shipping.amount())).bind(&v.preview_images).bind(&v.slide_images)
                .bind(to_i32(v.stock)?).bind(v.available)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_products(&mut conn, &[id], false).await?.remove(&id))
    }

    async fn find_product(&self, id_or_slug: &str) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        let parsed = Uuid::parse_str(id_or_slug).ok();
        let id: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE slug = $1 OR id = $2 LIMIT 1")
            .bind(id_or_slug).bind(parsed).fetch_optional(&mut *conn).await?;
        match id {
            Some((id,)) => Ok(load_products(&mut conn, &[id], false).await?.remove(&id)),
            None => Ok(None),
        }
    }

    async fn update_pricing(&self, product_id: Uuid, variant_id: Option<Uuid>, pricing: Pricing) -> Result<Product> {
        let mut tx = self.pool.begin().await?;
        let mut product = load_one_product(&mut tx, product_id, true).await?;
        product.update_pricing(variant_id, pricing)?;
        write_product_pricing(&mut tx, &product, variant_id).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn set_stock(&self, product_id: Uuid, variant_id: Option<Uuid>, stock: u32) -> Result<Product> {
        let mut tx = self.pool.begin().await?;
        let mut product = load_one_product(&mut tx, product_id, true).await?;
        product.set_stock(variant_id, stock)?;
        match variant_id {
            Some(id) => sqlx::query("UPDATE product_variants SET stock = $2 WHERE id = $1").bind(id).bind(to_i32(stock)?).execute(&mut *tx).await?,
            None => sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1").bind(product_id).bind(to_i32(stock)?).execute(&mut *tx).await?,
        };
        tx.commit().await?;
        Ok(product)
    }

    async fn cart(&self, user_id: Uuid) -> Result<Cart> {
        let rows = sqlx::query_as::<_, CartRow>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY added_at")
            .bind(user_id).fetch_all(&self.pool).await?;
        let lines = rows.into_iter().map(line_from_row).collect::<Result<Vec<_>>>()?;
        Ok(Cart::from_lines(user_id, lines))
    }

    async fn add_cart_line(&self, user_id: Uuid, line: NewCartLine) -> Result<CartLine> {
        let mut conn = self.pool.acquire().await?;
        upsert_cart_line(&mut conn, user_id, &line).await
    }

    async fn change_cart_quantity(&self, user_id: Uuid, line_id: Uuid, change: QuantityChange) -> Result<QuantityOutcome> {
        let mut tx = self.pool.begin().await?;
        let line = locked_line(&mut tx, user_id, line_id).await?;
        let outcome = Cart::from_lines(user_id, [line]).change_quantity(line_id, change)?;
        match &outcome {
            QuantityOutcome::Removed(_) => {
                sqlx::query("DELETE FROM cart_items WHERE id = $1").bind(line_id).execute(&mut *tx).await?;
            }
            QuantityOutcome::Updated(l) => {
                sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = $3 WHERE id = $1")
                    .bind(line_id).bind(to_i32(l.quantity.value())?).bind(l.updated_at).execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn change_cart_variant(&self, user_id: Uuid, line_id: Uuid, variant_id: Option<Uuid>) -> Result<CartLine> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, CartRow>("SELECT * FROM cart_items WHERE user_id = $1 FOR UPDATE")
            .bind(user_id).fetch_all(&mut *tx).await?;
        let mut cart = Cart::from_lines(user_id, rows.into_iter().map(line_from_row).collect::<Result<Vec<_>>>()?);
        let result = cart.change_variant(line_id, variant_id)?;
        if result.id == line_id {
            sqlx::query("UPDATE cart_items SET variant_id = $2, line_key = $3, updated_at = $4 WHERE id = $1")
                .bind(line_id).bind(result.variant_id).bind(result.key().to_string()).bind(result.updated_at)
                .execute(&mut *tx).await?;
        } else {
            sqlx::query("DELETE FROM cart_items WHERE id = $1").bind(line_id).execute(&mut *tx).await?;
            sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = $3 WHERE id = $1")
                .bind(result.id).bind(to_i32(result.quantity.value())?).bind(result.updated_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(result)
    }

    async fn set_cart_rent_days(&self, user_id: Uuid, line_id: Uuid, rent_days: Option<u32>) -> Result<CartLine> {
        let mut tx = self.pool.begin().await?;
        let line = locked_line(&mut tx, user_id, line_id).await?;
        let updated = Cart::from_lines(user_id, [line]).set_rent_days(line_id, rent_days)?;
        sqlx::query("UPDATE cart_items SET rent_days = $2, updated_at = $3 WHERE id = $1")
            .bind(line_id).bind(rent_days.map(to_i32).transpose()?).bind(updated.updated_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn remove_cart_line(&self, user_id: Uuid, line_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(line_id).bind(user_id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn empty_cart(&self, user_id: Uuid) -> Result<usize> {
        let done = sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(usize::try_from(done.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Wishlist> {
        let rows = sqlx::query_as::<_, WishlistRow>("SELECT * FROM wishlist_items WHERE user_id = $1 ORDER BY added_at")
            .bind(user_id).fetch_all(&self.pool).await?;
        Ok(Wishlist::from_items(user_id, rows.into_iter().map(wishlist_item_from_row)))
    }

    async fn add_wishlist_item(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>) -> Result<WishlistItem> {
        // the no-op update makes RETURNING yield the existing row
        let row = sqlx::query_as::<_, WishlistRow>("INSERT INTO wishlist_items (id, user_id, product_id, variant_id, item_key, added_at) \
            VALUES ($1, $2, $3, $4, $5, NOW()) ON CONFLICT (user_id, item_key) DO UPDATE SET item_key = EXCLUDED.item_key RETURNING *")
            .bind(Uuid::now_v7()).bind(user_id).bind(product_id).bind(variant_id).bind(wishlist_key(product_id, variant_id))
            .fetch_one(&self.pool).await?;
        Ok(wishlist_item_from_row(row))
    }

    async fn change_wishlist_variant(&self, user_id: Uuid, item_id: Uuid, variant_id: Option<Uuid>) -> Result<WishlistItem> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, WishlistRow>("SELECT * FROM wishlist_items WHERE user_id = $1 FOR UPDATE")
            .bind(user_id).fetch_all(&mut *tx).await?;
        let mut list = Wishlist::from_items(user_id, rows.into_iter().map(wishlist_item_from_row));
        let result = list.change_variant(item_id, variant_id)?;
        if result.id == item_id {
            sqlx::query("UPDATE wishlist_items SET variant_id = $2, item_key = $3 WHERE id = $1")
                .bind(item_id).bind(variant_id).bind(wishlist_key(result.product_id, variant_id))
                .execute(&mut *tx).await?;
        } else {
            sqlx::query("DELETE FROM wishlist_items WHERE id = $1").bind(item_id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(result)
    }

    async fn remove_wishlist_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM wishlist_items WHERE id = $1 AND user_id = $2")
            .bind(item_id).bind(user_id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn move_to_cart(&self, user_id: Uuid, item_id: Uuid, line: NewCartLine) -> Result<CartLine> {
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query("DELETE FROM wishlist_items WHERE id = $1 AND user_id = $2")
            .bind(item_id).bind(user_id).execute(&mut *tx).await?;
        if done.rows_affected() == 0 {
            return Err(EcommerceError::NotFound(format!("Wishlist item {item_id}")));
        }
        let added = upsert_cart_line(&mut tx, user_id, &line).await?;
        tx.commit().await?;
        Ok(added)
    }

    async fn place_order(&self, user_id: Uuid, line_ids: &[Uuid]) -> Result<OrderGroup> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, CartRow>("SELECT * FROM cart_items WHERE user_id = $1 AND id = ANY($2) FOR UPDATE")
            .bind(user_id).bind(line_ids).fetch_all(&mut *tx).await?;
        let mut by_id: HashMap<Uuid, CartLine> = HashMap::with_capacity(rows.len());
        for row in rows { let line = line_from_row(row)?; by_id.insert(line.id, line); }
        let lines = line_ids.iter()
            .map(|id| by_id.remove(id).ok_or_else(|| EcommerceError::NotFound(format!("Cart item {id}"))))
            .collect::<Result<Vec<_>>>()?;

        let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = load_products(&mut tx, &product_ids, true).await?;

        let mut decrements: Vec<&CartLine> = lines.iter().collect();
        decrements.sort_by_key(|l| (l.product_id, l.variant_id));
        for line in decrements {
            let qty = to_i32(line.quantity.value())?;
            let done = match line.variant_id {
                Some(v) => sqlx::query("UPDATE product_variants SET stock = stock - $1 WHERE id = $2 AND product_id = $3 AND available AND stock >= $1")
                    .bind(qty).bind(v).bind(line.product_id).execute(&mut *tx).await?,
                None => sqlx::query("UPDATE products SET stock = stock - $1, updated_at = NOW() WHERE id = $2 AND stock >= $1")
                    .bind(qty).bind(line.product_id).execute(&mut *tx).await?,
            };
            if done.rows_affected() == 0 {
                // dropping `tx` rolls back the decrements already made
                warn!(%user_id, product_id = %line.product_id, variant_id = ?line.variant_id, "checkout rejected, out of stock");
                return Err(EcommerceError::OutOfStock);
            }
        }

        let pairs = lines.iter()
            .map(|l| products.get(&l.product_id).map(|p| (l.clone(), p)).ok_or_else(|| EcommerceError::product_not_found(l.product_id)))
            .collect::<Result<Vec<_>>>()?;
        let group = OrderGroup::assemble(user_id, &pairs)?;

        sqlx::query("INSERT INTO order_groups (id, user_id, product_type, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(group.id()).bind(user_id).bind(group.product_type().as_str()).bind(group.status().as_str())
            .bind(group.created_at()).bind(group.updated_at())
            .execute(&mut *tx).await?;
        for (position, item) in group.items().iter().enumerate() {
            sqlx::query("INSERT INTO order_items (id, order_group_id, position, product_id, variant_id, title, size, color, currency, unit_price, shipping_price, quantity, line_total, rent_days, status) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)")
                .bind(item.id).bind(group.id()).bind(i32::try_from(position).unwrap_or(i32::MAX)).bind(item.product_id)
                .bind(item.variant_id).bind(&item.title).bind(&item.size).bind(&item.color)
                .bind(item.unit_price.currency()).bind(item.unit_price.amount()).bind(item.shipping.amount())
                .bind(to_i32(item.quantity.value())?).bind(item.line_total.amount())
                .bind(item.rent_days.map(to_i32).transpose()?).bind(item.status.as_str())
                .execute(&mut *tx).await?;
        }
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND id = ANY($2)")
            .bind(user_id).bind(line_ids).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(group)
    }

    async fn order_groups(&self, user_id: Uuid, product_type: ProductType, page: Page) -> Result<Paginated<OrderGroup>> {
        let mut conn = self.pool.acquire().await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM order_groups WHERE user_id = $1 AND product_type = $2")
            .bind(user_id).bind(product_type.as_str()).fetch_one(&mut *conn).await?;
        let rows = sqlx::query_as::<_, GroupRow>("SELECT * FROM order_groups WHERE user_id = $1 AND product_type = $2 ORDER BY created_at DESC LIMIT $3 OFFSET $4")
            .bind(user_id).bind(product_type.as_str()).bind(i64::from(page.limit))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
            .fetch_all(&mut *conn).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = load_items(&mut conn, &ids).await?;
        let data = rows.into_iter()
            .map(|row| { let its = items.remove(&row.id).unwrap_or_default(); group_from_rows(row, its) })
            .collect::<Result<Vec<_>>>()?;
        Ok(Paginated { data, total: u64::try_from(total).unwrap_or(0), page: page.page, limit: page.limit })
    }

    async fn order_group(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<OrderGroup>> {
        let mut conn = self.pool.acquire().await?;
        load_group(&mut conn, user_id, group_id, false).await
    }

    async fn cancel_order(&self, user_id: Uuid, group_id: Uuid) -> Result<OrderGroup> {
        let mut tx = self.pool.begin().await?;
        let mut group = load_group(&mut tx, user_id, group_id, true).await?
            .ok_or_else(|| EcommerceError::NotFound(format!("Order group {group_id}")))?;
        let to_restock = group.cancel()?;
        write_statuses(&mut tx, &group).await?;
        restock(&mut tx, &to_restock).await?;
        tx.commit().await?;
        Ok(group)
    }

    async fn cancel_order_item(&self, user_id: Uuid, item_id: Uuid) -> Result<OrderGroup> {
        let mut tx = self.pool.begin().await?;
        let group_id: Option<(Uuid,)> = sqlx::query_as("SELECT g.id FROM order_items i JOIN order_groups g ON g.id = i.order_group_id WHERE i.id = $1 AND g.user_id = $2")
            .bind(item_id).bind(user_id).fetch_optional(&mut *tx).await?;
        let (group_id,) = group_id.ok_or_else(|| EcommerceError::NotFound(format!("Order item {item_id}")))?;
        let mut group = load_group(&mut tx, user_id, group_id, true).await?
            .ok_or_else(|| EcommerceError::NotFound(format!("Order item {item_id}")))?;
        let to_restock = group.cancel_item(item_id)?;
        write_statuses(&mut tx, &group).await?;
        restock(&mut tx, &[to_restock]).await?;
        tx.commit().await?;
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{pricing, variant};
    use crate::domain::aggregates::NewProduct;

    /// Connects to `DATABASE_URL`. Without one these tests skip.
    async fn store() -> Option<PgStore> {
        dotenvy::dotenv().ok();
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping Postgres test");
            return None;
        };
        let store = PgStore::connect(&url, 5).await.unwrap();
        store.migrate().await.unwrap();
        Some(store)
    }

    async fn seed(store: &PgStore, slug: &str, stock: u32, variants: Vec<crate::domain::aggregates::NewVariant>) -> Product {
        let product = Product::create(NewProduct {
            slug: format!("{slug}-{}", Uuid::new_v4()), title: slug.to_uppercase(), category_id: None,
            is_variant_available: !variants.is_empty(), pricing: pricing(100), stock, variants,
        }).unwrap();
        store.insert_product(&product).await.unwrap();
        product
    }

    fn buy(product_id: Uuid, variant_id: Option<Uuid>, qty: u32) -> NewCartLine {
        NewCartLine { product_id, variant_id, product_type: ProductType::Buy, quantity: Quantity::new(qty).unwrap(), rent_days: None }
    }

    async fn stock_of(store: &PgStore, product_id: Uuid, variant_id: Option<Uuid>) -> u32 {
        let product = store.product(product_id).await.unwrap().unwrap();
        match variant_id {
            Some(v) => product.variant(v).unwrap().stock,
            None => product.stock(),
        }
    }

    #[tokio::test]
    async fn test_repeated_add_upserts_one_row() {
        let Some(store) = store().await else { return };
        let mug = seed(&store, "mug", 5, vec![]).await;
        let user = Uuid::new_v4();

        let first = store.add_cart_line(user, buy(mug.id(), None, 1)).await.unwrap();
        let second = store.add_cart_line(user, buy(mug.id(), None, 1)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity.value(), 2);

        let (a, b) = tokio::join!(
            store.add_cart_line(user, buy(mug.id(), None, 1)),
            store.add_cart_line(user, buy(mug.id(), None, 1)),
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);
        let cart = store.cart(user).await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.line(first.id).unwrap().quantity.value(), 4);

        let capped = store.add_cart_line(user, buy(mug.id(), None, 999)).await.unwrap();
        assert_eq!(capped.quantity, Quantity::MAX);
    }

    #[tokio::test]
    async fn test_failed_checkout_leaves_cart_and_stock() {
        let Some(store) = store().await else { return };
        let mug = seed(&store, "mug", 5, vec![]).await;
        let bowl = seed(&store, "bowl", 1, vec![]).await;
        let user = Uuid::new_v4();
        let a = store.add_cart_line(user, buy(mug.id(), None, 2)).await.unwrap();
        let b = store.add_cart_line(user, buy(bowl.id(), None, 3)).await.unwrap();

        assert!(matches!(store.place_order(user, &[a.id, b.id]).await, Err(EcommerceError::OutOfStock)));
        assert_eq!(store.cart(user).await.unwrap().len(), 2);
        assert_eq!(stock_of(&store, mug.id(), None).await, 5);
        assert_eq!(stock_of(&store, bowl.id(), None).await, 1);

        let group = store.place_order(user, &[a.id]).await.unwrap();
        assert_eq!(group.items().len(), 1);
        assert_eq!(stock_of(&store, mug.id(), None).await, 3);
        let cart = store.cart(user).await.unwrap();
        assert!(cart.line(a.id).is_none());
        assert!(cart.line(b.id).is_some());
    }

    #[tokio::test]
    async fn test_order_round_trip_and_cancel_item_restock() {
        let Some(store) = store().await else { return };
        let shirt = seed(&store, "shirt", 0, vec![variant("S", "Red", 3), variant("M", "Red", 0)]).await;
        let mug = seed(&store, "mug", 4, vec![]).await;
        let small = shirt.variants()[0].id;
        let user = Uuid::new_v4();
        let a = store.add_cart_line(user, buy(shirt.id(), Some(small), 2)).await.unwrap();
        let b = store.add_cart_line(user, buy(mug.id(), None, 1)).await.unwrap();

        let placed = store.place_order(user, &[a.id, b.id]).await.unwrap();
        assert_eq!(stock_of(&store, shirt.id(), Some(small)).await, 1);
        assert_eq!(stock_of(&store, mug.id(), None).await, 3);

        let stored = store.order_group(user, placed.id()).await.unwrap().unwrap();
        assert_eq!(stored.items(), placed.items());
        assert_eq!(stored.total(), placed.total());
        assert_eq!(stored.items()[0].size.as_deref(), Some("S"));
        let page = store.order_groups(user, ProductType::Buy, Page::new(1, 10)).await.unwrap();
        assert_eq!((page.total, page.data.len()), (1, 1));

        let (first, second) = (placed.items()[0].id, placed.items()[1].id);
        let after = store.cancel_order_item(user, first).await.unwrap();
        assert_eq!(after.status(), OrderStatus::Placed);
        assert_eq!(after.item(first).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&store, shirt.id(), Some(small)).await, 3);

        let after = store.cancel_order_item(user, second).await.unwrap();
        assert_eq!(after.status(), OrderStatus::Cancelled);
        assert_eq!(stock_of(&store, mug.id(), None).await, 4);
        assert!(matches!(store.cancel_order(user, placed.id()).await, Err(EcommerceError::Conflict(_))));
        let reloaded = store.order_group(user, placed.id()).await.unwrap().unwrap();
        assert_eq!(reloaded.status(), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_conflict() {
        let Some(store) = store().await else { return };
        let mug = seed(&store, "mug", 1, vec![]).await;
        let copy = Product::create(NewProduct {
            slug: mug.slug().to_string(), title: "Copy".into(), category_id: None, is_variant_available: false,
            pricing: pricing(10), stock: 0, variants: vec![],
        }).unwrap();
        assert!(matches!(store.insert_product(&copy).await, Err(EcommerceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_find_product_accepts_any_uuid_form() {
        let Some(store) = store().await else { return };
        let mug = seed(&store, "mug", 1, vec![]).await;
        let forms = [
            mug.id().to_string(),
            mug.id().to_string().to_uppercase(),
            mug.id().simple().to_string(),
            mug.id().urn().to_string(),
            mug.slug().to_string(),
        ];
        for form in forms {
            let found = store.find_product(&form).await.unwrap();
            assert_eq!(found.map(|p| p.id()), Some(mug.id()), "{form}");
        }
        assert!(store.find_product("no-such-product").await.unwrap().is_none());
    }
}
