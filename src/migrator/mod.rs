use sea_orm_migration::prelude::*;

mod m20260301_000001_create_user_profiles;
mod m20260301_000002_create_emergency_contacts;
mod m20260301_000003_enable_row_level_security;
mod m20260301_000004_create_delete_user_account;

/// Schema of the `public` tables behind the profile page. Runs against the
/// project's Postgres with a role that can reference `auth.users`.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_user_profiles::Migration),
            Box::new(m20260301_000002_create_emergency_contacts::Migration),
            Box::new(m20260301_000003_enable_row_level_security::Migration),
            Box::new(m20260301_000004_create_delete_user_account::Migration),
        ]
    }
}
