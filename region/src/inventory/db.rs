//! `SQLite` persistence for the inventory.
//!
//! The database is a write-through copy of the in-memory tables: it's read once
//! at startup and afterwards only written to, always while the inventory lock
//! is held.

use core::net::IpAddr;
use core::str::FromStr;
use std::path::Path;

use ipnet::IpNet;
use sqlx::{
    Row as _, SqliteExecutor, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};

use super::Tables;
use crate::{
    lifecycle::PlannedTransition,
    model::{
        AddressRecord, AddressType, AuditEntry, Host, HostId, HostKind, HostStatus, Interface,
        InterfaceId, InterfaceKind, IpRange, IpRangeKind, RdnsMode, Subnet, SubnetId,
    },
};

pub type DbPool = SqlitePool;

/// Opens (creating if needed) the database at `path` and applies the embedded schema.
///
/// `:memory:` opens a private in-memory database.
pub async fn init(path: &Path) -> Result<DbPool, sqlx::Error> {
    let (options, max_connections) = if path == Path::new(":memory:") {
        (SqliteConnectOptions::from_str("sqlite::memory:")?, 1)
    } else {
        (
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            4,
        )
    };
    // The in-memory database lives exactly as long as its only connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options.foreign_keys(true))
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

fn decode_err(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

fn code<T>(row: &SqliteRow, column: &str, from_code: fn(u8) -> Option<T>) -> Result<T, sqlx::Error> {
    let raw: i64 = row.try_get(column)?;
    u8::try_from(raw)
        .ok()
        .and_then(from_code)
        .ok_or_else(|| decode_err(format!("Unknown code {raw} in column {column}")))
}

fn parsed<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: core::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: T::Err| sqlx::Error::Decode(Box::new(e)))
}

fn parsed_opt<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: core::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| s.parse().map_err(|e: T::Err| sqlx::Error::Decode(Box::new(e))))
        .transpose()
}

fn host_from_row(row: &SqliteRow) -> Result<Host, sqlx::Error> {
    Ok(Host {
        id: row.try_get("id")?,
        hostname: row.try_get("hostname")?,
        status: code(row, "status", HostStatus::from_code)?,
        kind: code(row, "kind", HostKind::from_code)?,
        owner: row.try_get("owner")?,
    })
}

fn subnet_from_row(row: &SqliteRow) -> Result<Subnet, sqlx::Error> {
    let dns_servers: String = row.try_get("dns_servers")?;
    let vlan: Option<i64> = row.try_get("vlan")?;
    Ok(Subnet {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        cidr: parsed::<IpNet>(row, "cidr")?,
        vlan: vlan
            .map(|v| u16::try_from(v).map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .transpose()?,
        space: row.try_get("space")?,
        rdns_mode: code(row, "rdns_mode", RdnsMode::from_code)?,
        gateway_ip: parsed_opt(row, "gateway_ip")?,
        managed: row.try_get("managed")?,
        allow_proxy: row.try_get("allow_proxy")?,
        active_discovery: row.try_get("active_discovery")?,
        dns_servers: dns_servers
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
    })
}

fn range_from_row(row: &SqliteRow) -> Result<IpRange, sqlx::Error> {
    Ok(IpRange {
        id: row.try_get("id")?,
        subnet_id: row.try_get("subnet_id")?,
        start: parsed(row, "start_ip")?,
        end: parsed(row, "end_ip")?,
        kind: code(row, "kind", IpRangeKind::from_code)?,
        comment: row.try_get("comment")?,
    })
}

fn interface_from_row(row: &SqliteRow) -> Result<Interface, sqlx::Error> {
    Ok(Interface {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: code(row, "kind", InterfaceKind::from_code)?,
        host_id: row.try_get("host_id")?,
        mac: row.try_get("mac")?,
        subnet_id: row.try_get("subnet_id")?,
        link_up: row.try_get("link_up")?,
    })
}

fn address_from_row(row: &SqliteRow) -> Result<AddressRecord, sqlx::Error> {
    Ok(AddressRecord {
        id: row.try_get("id")?,
        ip: parsed(row, "ip")?,
        subnet_id: row.try_get("subnet_id")?,
        kind: code(row, "kind", AddressType::from_code)?,
        interface_id: row.try_get("interface_id")?,
        mac: row.try_get("mac")?,
        created: row.try_get("created")?,
    })
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditEntry, sqlx::Error> {
    Ok(AuditEntry {
        id: row.try_get("id")?,
        timestamp: row.try_get("timestamp")?,
        user: row.try_get("user")?,
        action: row.try_get("action")?,
        subnet_id: row.try_get("subnet_id")?,
        cidr: row.try_get("cidr")?,
        detail: row.try_get("detail")?,
    })
}

/// Reads every table except the audit log into memory.
pub async fn load(pool: &DbPool) -> Result<Tables, sqlx::Error> {
    let mut tables = Tables::default();
    for row in sqlx::query("SELECT * FROM hosts").fetch_all(pool).await? {
        let host = host_from_row(&row)?;
        tables.hosts.insert(host.id, host);
    }
    for row in sqlx::query("SELECT * FROM subnets").fetch_all(pool).await? {
        let subnet = subnet_from_row(&row)?;
        tables.subnets.insert(subnet.id, subnet);
    }
    for row in sqlx::query("SELECT * FROM ip_ranges").fetch_all(pool).await? {
        let range = range_from_row(&row)?;
        tables.ranges.insert(range.id, range);
    }
    for row in sqlx::query("SELECT * FROM interfaces").fetch_all(pool).await? {
        let interface = interface_from_row(&row)?;
        tables.interfaces.insert(interface.id, interface);
    }
    for row in sqlx::query("SELECT * FROM ip_addresses").fetch_all(pool).await? {
        let address = address_from_row(&row)?;
        tables.addresses.insert(address.ip, address);
    }
    let last_audit: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM audit_log")
        .fetch_one(pool)
        .await?;
    tables.reset_next_id(last_audit);
    Ok(tables)
}

/// The audit log, oldest first.
pub async fn load_audit(pool: &DbPool) -> Result<Vec<AuditEntry>, sqlx::Error> {
    sqlx::query("SELECT * FROM audit_log ORDER BY id")
        .fetch_all(pool)
        .await?
        .iter()
        .map(audit_from_row)
        .collect()
}

pub async fn insert_host(pool: &DbPool, host: &Host) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO hosts (id, hostname, status, kind, owner) VALUES (?, ?, ?, ?, ?)")
        .bind(host.id)
        .bind(&host.hostname)
        .bind(i64::from(host.status.code()))
        .bind(i64::from(host.kind.code()))
        .bind(&host.owner)
        .execute(pool)
        .await?;
    Ok(())
}

/// Stores the planned status only if the row still holds `planned.from`.
///
/// Returns whether the row was updated.
pub async fn compare_and_set_status(
    pool: &DbPool,
    id: HostId,
    planned: &PlannedTransition,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE hosts SET status = ?, owner = ? WHERE id = ? AND status = ?")
        .bind(i64::from(planned.to.code()))
        .bind(&planned.owner)
        .bind(id)
        .bind(i64::from(planned.from.code()))
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Deletes a host; its interfaces stay, unlinked.
pub async fn delete_host(pool: &DbPool, id: HostId) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE interfaces SET host_id = NULL WHERE host_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM hosts WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

pub async fn insert_subnet(pool: &DbPool, subnet: &Subnet) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO subnets (id, name, description, cidr, vlan, space, rdns_mode, gateway_ip, \
         managed, allow_proxy, active_discovery, dns_servers) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(subnet.id)
    .bind(&subnet.name)
    .bind(&subnet.description)
    .bind(subnet.cidr.to_string())
    .bind(subnet.vlan.map(i64::from))
    .bind(&subnet.space)
    .bind(i64::from(subnet.rdns_mode.code()))
    .bind(subnet.gateway_ip.map(|ip| ip.to_string()))
    .bind(subnet.managed)
    .bind(subnet.allow_proxy)
    .bind(subnet.active_discovery)
    .bind(subnet.dns_servers_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes a subnet together with its ranges and address records, and unlinks
/// interfaces attached to it.
pub async fn delete_subnet(pool: &DbPool, id: SubnetId) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in [
        "DELETE FROM ip_addresses WHERE subnet_id = ?",
        "DELETE FROM ip_ranges WHERE subnet_id = ?",
        "UPDATE interfaces SET subnet_id = NULL WHERE subnet_id = ?",
        "DELETE FROM subnets WHERE id = ?",
    ] {
        sqlx::query(statement).bind(id).execute(&mut *tx).await?;
    }
    tx.commit().await
}

pub async fn insert_range(pool: &DbPool, range: &IpRange) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO ip_ranges (id, subnet_id, start_ip, end_ip, kind, comment) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(range.id)
    .bind(range.subnet_id)
    .bind(range.start.to_string())
    .bind(range.end.to_string())
    .bind(i64::from(range.kind.code()))
    .bind(&range.comment)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_interface(pool: &DbPool, interface: &Interface) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO interfaces (id, name, kind, host_id, mac, subnet_id, link_up) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(interface.id)
    .bind(&interface.name)
    .bind(i64::from(interface.kind.code()))
    .bind(interface.host_id)
    .bind(&interface.mac)
    .bind(interface.subnet_id)
    .bind(interface.link_up)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes an interface and the address records assigned to it.
pub async fn delete_interface(pool: &DbPool, id: InterfaceId) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM ip_addresses WHERE interface_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM interfaces WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

pub async fn insert_address(
    executor: impl SqliteExecutor<'_>,
    address: &AddressRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO ip_addresses (id, ip, subnet_id, kind, interface_id, mac, created) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(address.id)
    .bind(address.ip.to_string())
    .bind(address.subnet_id)
    .bind(i64::from(address.kind.code()))
    .bind(address.interface_id)
    .bind(&address.mac)
    .bind(address.created)
    .execute(executor)
    .await?;
    Ok(())
}

/// Inserts every record or none of them.
pub async fn insert_addresses(pool: &DbPool, addresses: &[AddressRecord]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for address in addresses {
        insert_address(&mut *tx, address).await?;
    }
    tx.commit().await
}

pub async fn delete_address(pool: &DbPool, ip: IpAddr) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM ip_addresses WHERE ip = ?")
        .bind(ip.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_audit(pool: &DbPool, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_log (id, timestamp, user, action, subnet_id, cidr, detail) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id)
    .bind(entry.timestamp)
    .bind(&entry.user)
    .bind(&entry.action)
    .bind(entry.subnet_id)
    .bind(&entry.cidr)
    .bind(&entry.detail)
    .execute(pool)
    .await?;
    Ok(())
}
