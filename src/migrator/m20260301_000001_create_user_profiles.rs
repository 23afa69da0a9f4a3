use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserProfiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserProfiles::FullName).string())
                    .col(ColumnDef::new(UserProfiles::Email).string())
                    .col(ColumnDef::new(UserProfiles::Phone).string())
                    .col(ColumnDef::new(UserProfiles::Address).text())
                    .col(ColumnDef::new(UserProfiles::Role).string())
                    .col(ColumnDef::new(UserProfiles::AvatarUrl).text())
                    .col(
                        ColumnDef::new(UserProfiles::Verified)
                            .boolean()
                            .default(false)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserProfiles::Stats)
                            .json_binary()
                            .default(Expr::cust("'{}'::jsonb"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserProfiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserProfiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    // Removing the auth user removes the profile and, through
                    // it, everything else the user owns.
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_profiles_auth_user")
                            .from(UserProfiles::Table, UserProfiles::Id)
                            .to((Alias::new("auth"), Alias::new("users")), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserProfiles {
    Table,
    Id,
    FullName,
    Email,
    Phone,
    Address,
    Role,
    AvatarUrl,
    Verified,
    Stats,
    CreatedAt,
    UpdatedAt,
}
