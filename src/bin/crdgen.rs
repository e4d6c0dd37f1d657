use challenge_operator::crd::Challenge;
use kube::CustomResourceExt;

fn main() {
    print!("{}", serde_yaml::to_string(&Challenge::crd()).unwrap());
}
