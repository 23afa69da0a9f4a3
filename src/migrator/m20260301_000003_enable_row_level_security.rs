use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const UP: &str = r#"
alter table public.user_profiles enable row level security;

create policy "profile readable by owner" on public.user_profiles
    for select using (auth.uid() = id);

create policy "profile editable by owner" on public.user_profiles
    for update using (auth.uid() = id) with check (auth.uid() = id);

alter table public.emergency_contacts enable row level security;

create policy "contacts managed by owner" on public.emergency_contacts
    for all using (auth.uid() = user_id) with check (auth.uid() = user_id);
"#;

const DOWN: &str = r#"
drop policy if exists "contacts managed by owner" on public.emergency_contacts;
alter table public.emergency_contacts disable row level security;

drop policy if exists "profile editable by owner" on public.user_profiles;
drop policy if exists "profile readable by owner" on public.user_profiles;
alter table public.user_profiles disable row level security;
"#;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(DOWN).await?;
        Ok(())
    }
}
