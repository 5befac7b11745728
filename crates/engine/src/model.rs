//! Reference data model
//!
//! A subset of the ECSS-E-TM-10-25 concepts, enough to drive every code path
//! of the processor: the site directory with persons, domains and model
//! setups, and an engineering model with iterations, element definitions,
//! parameters, options and the domain file store.
//!
//! The model is built once and shared.

use comet_core::{CometResult, MetaModel, MetaModelBuilder};
use once_cell::sync::OnceCell;
use std::sync::Arc;

static ECSS_MODEL: OnceCell<Arc<MetaModel>> = OnceCell::new();

/// Shared reference model
pub fn ecss_model() -> CometResult<Arc<MetaModel>> {
    ECSS_MODEL
        .get_or_try_init(|| build_ecss_model().map(Arc::new))
        .cloned()
}

fn build_ecss_model() -> CometResult<MetaModel> {
    let mut b = MetaModelBuilder::new();
    site_directory(&mut b)?;
    engineering_model(&mut b)?;
    file_store(&mut b)?;
    b.build()
}

fn site_directory(b: &mut MetaModelBuilder) -> CometResult<()> {
    b.add_type("SiteDirectory")
        .top_container()
        .scalar("Name")
        .scalar("ShortName")
        .composite("Person", "Person")
        .composite("Domain", "DomainOfExpertise")
        .composite("Model", "EngineeringModelSetup")
        .composite("SiteReferenceDataLibrary", "SiteReferenceDataLibrary")
        .done()?;
    b.add_type("Person")
        .mandatory("GivenName")
        .mandatory("Surname")
        .scalar("ShortName")
        .scalar("IsActive")
        .reference("DefaultDomain", "DomainOfExpertise")
        .done()?;
    b.add_type("DomainOfExpertise")
        .mandatory("Name")
        .mandatory("ShortName")
        .scalar("IsDeprecated")
        .done()?;
    b.add_type("EngineeringModelSetup")
        .mandatory("Name")
        .mandatory("ShortName")
        .scalar("EngineeringModelIid")
        .list("ActiveDomain", "DomainOfExpertise")
        .composite("Participant", "Participant")
        .done()?;
    b.add_type("Participant")
        .mandatory_reference("Person", "Person")
        .list("Domain", "DomainOfExpertise")
        .reference("SelectedDomain", "DomainOfExpertise")
        .scalar("IsActive")
        .done()?;
    b.add_type("SiteReferenceDataLibrary")
        .mandatory("Name")
        .mandatory("ShortName")
        .composite("DefinedCategory", "Category")
        .done()?;
    b.add_type("Category")
        .mandatory("Name")
        .mandatory("ShortName")
        .scalar("IsAbstract")
        .list("SuperCategory", "Category")
        .done()?;
    Ok(())
}

// Site directory things are named by plain scalars from model types: they
// live in another revision scope and are never resolved by a model request.
fn engineering_model(b: &mut MetaModelBuilder) -> CometResult<()> {
    b.add_type("EngineeringModel")
        .top_container()
        .scalar("EngineeringModelSetup")
        .composite("Iteration", "Iteration")
        .done()?;
    b.add_type("Iteration")
        .mandatory("IterationNumber")
        .scalar("Description")
        .composite("Element", "ElementDefinition")
        .ordered_composite("Option", "Option")
        .composite("DomainFileStore", "DomainFileStore")
        .reference("TopElement", "ElementDefinition")
        .reference("DefaultOption", "Option")
        .done()?;
    b.add_type("ElementDefinition")
        .iteration_scoped()
        .mandatory("Name")
        .mandatory("ShortName")
        .scalar("Owner")
        .list("Category", "Category")
        .composite("Definition", "Definition")
        .composite("Parameter", "Parameter")
        .done()?;
    b.add_type("Definition")
        .iteration_scoped()
        .mandatory("Content")
        .scalar("LanguageCode")
        .ordered_values("Note")
        .ordered_values("Example")
        .done()?;
    b.add_type("Parameter")
        .iteration_scoped()
        .mandatory("ParameterType")
        .scalar("Owner")
        .scalar("IsOptionDependent")
        .composite("ValueSet", "ParameterValueSet")
        .composite("ParameterSubscription", "ParameterSubscription")
        .done()?;
    b.add_type("ParameterValueSet")
        .iteration_scoped()
        .value_array("Manual")
        .value_array("Computed")
        .value_array("Published")
        .scalar("ValueSwitch")
        .done()?;
    b.add_type("ParameterSubscription")
        .iteration_scoped()
        .scalar("Owner")
        .composite("ValueSet", "ParameterSubscriptionValueSet")
        .done()?;
    b.add_type("ParameterSubscriptionValueSet")
        .iteration_scoped()
        .value_array("Manual")
        .scalar("ValueSwitch")
        .scalar("SubscribedValueSet")
        .done()?;
    b.add_type("Option")
        .iteration_scoped()
        .mandatory("Name")
        .mandatory("ShortName")
        .done()?;
    Ok(())
}

fn file_store(b: &mut MetaModelBuilder) -> CometResult<()> {
    b.add_type("DomainFileStore")
        .iteration_scoped()
        .mandatory("Name")
        .scalar("Owner")
        .scalar("CreatedOn")
        .composite("Folder", "Folder")
        .composite("File", "File")
        .done()?;
    b.add_type("Folder")
        .iteration_scoped()
        .mandatory("Name")
        .scalar("Owner")
        .scalar("CreatedOn")
        .reference("ContainingFolder", "Folder")
        .done()?;
    b.add_type("File")
        .iteration_scoped()
        .scalar("Owner")
        .scalar("LockedBy")
        .list("Category", "Category")
        .composite("FileRevision", "FileRevision")
        .done()?;
    b.add_type("FileRevision")
        .iteration_scoped()
        .file_content("ContentHash")
        .mandatory("Name")
        .scalar("Creator")
        .scalar("CreatedOn")
        .reference("ContainingFolder", "Folder")
        .done()?;
    Ok(())
}
